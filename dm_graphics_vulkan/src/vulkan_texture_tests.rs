use super::*;
use crate::recording_device::RecordingDevice;

fn texture(texture_type: TextureType, usage_hint: TextureUsageFlags) -> VulkanTexture {
    VulkanTexture::new(&TextureCreationParams {
        texture_type,
        width: 64,
        height: 32,
        mip_map_count: 3,
        usage_hint,
        ..Default::default()
    })
}

#[test]
fn test_cube_texture_has_six_layers() {
    let tex = texture(TextureType::TextureCube, TextureUsageFlags::SAMPLE);
    assert_eq!(tex.layer_count, 6);
    let desc = tex.image_desc(vk::Format::R8G8B8A8_UNORM);
    assert_eq!(desc.array_layers, 6);
    assert!(desc.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
    assert_eq!(tex.view_desc(vk::Format::R8G8B8A8_UNORM).view_type, vk::ImageViewType::CUBE);
}

#[test]
fn test_image_usage_follows_hint() {
    let sampled = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    let usage = sampled.image_usage(vk::Format::R8G8B8A8_UNORM);
    assert!(usage.contains(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST));
    assert!(!usage.contains(vk::ImageUsageFlags::STORAGE));

    let storage = texture(TextureType::Image2D, TextureUsageFlags::STORAGE | TextureUsageFlags::COLOR);
    let usage = storage.image_usage(vk::Format::R8G8B8A8_UNORM);
    assert!(usage.contains(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::COLOR_ATTACHMENT));
    assert_eq!(storage.shader_read_layout(), vk::ImageLayout::GENERAL);

    let depth = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    let usage = depth.image_usage(vk::Format::D24_UNORM_S8_UINT);
    assert!(usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
    assert!(!usage.contains(vk::ImageUsageFlags::SAMPLED));
}

#[test]
fn test_needs_allocation_on_format_or_size_change() {
    let device = RecordingDevice::new();
    let mut tex = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    let params = TextureParams { format: TextureFormat::Rgba, width: 64, height: 32, ..Default::default() };
    assert!(tex.needs_allocation(&params));

    tex.allocate(&device, TextureFormat::Rgba, vk::Format::R8G8B8A8_UNORM, false).unwrap();
    assert!(tex.is_allocated());
    assert!(!tex.needs_allocation(&params));
    assert!(tex.needs_allocation(&TextureParams { format: TextureFormat::Luminance, ..params.clone() }));
    assert!(tex.needs_allocation(&TextureParams { width: 128, ..params.clone() }));
    assert!(!tex.needs_allocation(&TextureParams { width: 32, height: 16, mip_map: 1, ..params.clone() }));
    assert!(!tex.needs_allocation(&TextureParams { format: TextureFormat::Luminance, sub_update: true, ..params }));
}

#[test]
fn test_take_native_objects_clears_handles() {
    let device = RecordingDevice::new();
    let mut tex = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    tex.allocate(&device, TextureFormat::Rgba, vk::Format::R8G8B8A8_UNORM, false).unwrap();

    let objects = tex.take_native_objects();
    assert_eq!(objects.len(), 2);
    assert!(!tex.is_allocated());
    assert_eq!(tex.view, vk::ImageView::null());
    assert!(tex.take_native_objects().is_empty());
}

#[test]
fn test_transition_tracks_layout() {
    let device = RecordingDevice::new();
    let mut tex = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    tex.allocate(&device, TextureFormat::Rgba, vk::Format::R8G8B8A8_UNORM, false).unwrap();

    let barrier = tex.transition(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(barrier.mip_levels, 3);
    assert_eq!(barrier.dst_access, vk::AccessFlags::TRANSFER_WRITE);

    let barrier = tex.transition(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(barrier.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(tex.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
}

#[test]
fn test_rgb_is_expanded_for_rgba_images() {
    let data = [1u8, 2, 3, 4, 5, 6];
    let staged = staging_bytes(TextureFormat::Rgb, vk::Format::R8G8B8A8_UNORM, &data);
    assert_eq!(&*staged, &[1, 2, 3, 255, 4, 5, 6, 255]);

    let untouched = staging_bytes(TextureFormat::Rgb, vk::Format::R8G8B8_UNORM, &data);
    assert!(matches!(untouched, Cow::Borrowed(_)));
}

#[test]
fn test_copy_regions_per_cube_face() {
    let mut tex = texture(TextureType::TextureCube, TextureUsageFlags::SAMPLE);
    tex.vk_format = vk::Format::R8G8B8A8_UNORM;
    let params = TextureParams { width: 64, height: 32, mip_map: 1, ..Default::default() };

    let regions = copy_regions(&tex, &params, 6 * 1024);
    assert_eq!(regions.len(), 6);
    assert_eq!(regions[5].buffer_offset, 5 * 1024);
    assert_eq!(regions[5].base_array_layer, 5);
    assert_eq!(regions[0].mip_level, 1);
}

#[test]
fn test_copy_regions_for_sub_update() {
    let mut tex = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    tex.vk_format = vk::Format::R8G8B8A8_UNORM;
    let params = TextureParams { width: 8, height: 4, x: 16, y: 2, sub_update: true, ..Default::default() };

    let regions = copy_regions(&tex, &params, 128);
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].image_offset, vk::Offset3D { x: 16, y: 2, z: 0 });
    assert_eq!(regions[0].image_extent, vk::Extent3D { width: 8, height: 4, depth: 1 });
}

#[test]
fn test_upload_region_must_fit_the_mip() {
    let tex = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    let mip = |mip_map, width, height| TextureParams { width, height, mip_map, ..Default::default() };
    assert!(tex.check_upload_region(&mip(2, 16, 8)).is_ok());
    assert!(matches!(tex.check_upload_region(&mip(3, 8, 4)), Err(Error::InvalidResource(_))));
    assert!(matches!(tex.check_upload_region(&mip(1, 64, 32)), Err(Error::InvalidResource(_))));

    let sub = |x, y, width, height| TextureParams { width, height, x, y, sub_update: true, ..Default::default() };
    assert!(tex.check_upload_region(&sub(56, 28, 8, 4)).is_ok());
    assert!(tex.check_upload_region(&sub(57, 0, 8, 4)).is_err());
    assert!(tex.check_upload_region(&sub(0, 29, 8, 4)).is_err());
    assert!(tex.check_upload_region(&TextureParams { z: 1, ..sub(0, 0, 8, 4) }).is_err());
}

#[test]
fn test_record_upload_wraps_copy_in_barriers() {
    let device = RecordingDevice::new();
    let mut tex = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    tex.allocate(&device, TextureFormat::Rgba, vk::Format::R8G8B8A8_UNORM, false).unwrap();
    let cb = device.allocate_command_buffer(crate::vulkan_device::CommandPoolKind::Upload).unwrap();
    let staging = device.create_buffer(64 * 32 * 4, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();

    let params = TextureParams { width: 64, height: 32, ..Default::default() };
    let regions = copy_regions(&tex, &params, 64 * 32 * 4);
    record_upload(&device, cb, &mut tex, staging, regions);

    let commands = device.commands(cb);
    assert_eq!(commands.len(), 3);
    assert!(matches!(commands[0], Command::PipelineBarrier(b) if b.new_layout == vk::ImageLayout::TRANSFER_DST_OPTIMAL));
    assert!(matches!(commands[1], Command::CopyBufferToImage { .. }));
    assert!(matches!(commands[2], Command::PipelineBarrier(b) if b.new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
}

#[test]
fn test_mip_upload_transitions_the_whole_image() {
    let device = RecordingDevice::new();
    let mut tex = texture(TextureType::Texture2D, TextureUsageFlags::SAMPLE);
    tex.allocate(&device, TextureFormat::Rgba, vk::Format::R8G8B8A8_UNORM, false).unwrap();
    let cb = device.allocate_command_buffer(crate::vulkan_device::CommandPoolKind::Upload).unwrap();
    let staging = device.create_buffer(32 * 16 * 4, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();

    let params = TextureParams { width: 32, height: 16, mip_map: 1, ..Default::default() };
    let regions = copy_regions(&tex, &params, 32 * 16 * 4);
    record_upload(&device, cb, &mut tex, staging, regions);

    let commands = device.commands(cb);
    for command in [&commands[0], &commands[2]] {
        assert!(matches!(command, Command::PipelineBarrier(b) if b.mip_levels == 3 && b.array_layers == 1));
    }
}

use super::*;

fn position_uv() -> VertexStreamDeclaration {
    VertexStreamDeclaration::new()
        .add_stream("position", 3, VertexType::Float, false)
        .add_stream("texcoord0", 2, VertexType::Float, false)
}

#[test]
fn test_streams_are_packed_in_order() {
    let decl = VertexDeclaration::new(&position_uv());
    assert_eq!(decl.stride, 20);
    assert_eq!(decl.streams[0].offset, 0);
    assert_eq!(decl.streams[1].offset, 12);
    assert_eq!(decl.step_function, VertexStepFunction::Vertex);
}

#[test]
fn test_stream_lookup_by_name_hash() {
    let decl = VertexDeclaration::new(&position_uv());
    let uv = decl.stream(hash_name("texcoord0")).unwrap();
    assert_eq!(uv.size, 2);
    assert!(decl.stream(hash_name("normal")).is_none());
}

#[test]
fn test_pipeline_hash_is_stable_and_layout_sensitive() {
    let a = VertexDeclaration::new(&position_uv());
    let b = VertexDeclaration::new(&position_uv());
    assert_eq!(a.pipeline_hash, b.pipeline_hash);

    let normalized = VertexDeclaration::new(
        &VertexStreamDeclaration::new()
            .add_stream("position", 3, VertexType::Float, false)
            .add_stream("texcoord0", 2, VertexType::Float, true),
    );
    assert_ne!(a.pipeline_hash, normalized.pipeline_hash);

    let strided = VertexDeclaration::with_stride(&position_uv(), 32);
    assert_eq!(strided.stride, 32);
    assert_ne!(a.pipeline_hash, strided.pipeline_hash);
}

#[test]
fn test_instance_step_function() {
    let decl = VertexDeclaration::new(
        &VertexStreamDeclaration::new()
            .add_stream("mtx_world", 4, VertexType::Float, false)
            .step_function(VertexStepFunction::Instance),
    );
    assert_eq!(decl.step_function, VertexStepFunction::Instance);
    assert_eq!(decl.stride, 16);
}

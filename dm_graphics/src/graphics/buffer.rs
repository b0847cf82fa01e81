/// Buffer usage hints and index formats

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    StaticDraw,
    DynamicDraw,
    StreamDraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexBufferFormat {
    U16,
    U32,
}

impl IndexBufferFormat {
    pub fn size(self) -> u32 {
        match self {
            IndexBufferFormat::U16 => 2,
            IndexBufferFormat::U32 => 4,
        }
    }
}

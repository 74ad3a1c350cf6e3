use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of buffer at offset {offset} (need {needed} more bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("bad model signature {found:02x?}, expected \"PMX \"")]
    BadModelSignature { found: [u8; 4] },

    #[error("unsupported text encoding id {value} in model header")]
    UnsupportedTextEncoding { value: u8 },

    #[error("unsupported {field} index width {width}, expected 1, 2 or 4")]
    UnsupportedIndexWidth { field: &'static str, width: u8 },

    #[error("unsupported skinning method {method} for vertex {vertex}")]
    UnsupportedSkinningMethod { vertex: usize, method: u8 },

    #[error("unknown morph type {value} for morph '{morph}'")]
    UnknownMorphType { morph: String, value: u8 },

    #[error("invalid {encoding} text at offset {offset}")]
    InvalidText {
        encoding: &'static str,
        offset: usize,
    },

    #[error("{context} index {index} out of range (count {count})")]
    IndexOutOfRange {
        context: &'static str,
        index: usize,
        count: usize,
    },

    #[error("bone {bone} has parent {parent}, parents must precede children")]
    ParentOutOfOrder { bone: usize, parent: usize },

    #[error("failed to parse PMX model: {message}")]
    ModelParse { message: String },
}

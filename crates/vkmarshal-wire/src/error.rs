#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("short read: needed {needed} bytes, {remaining} remaining")]
    ShortRead { needed: usize, remaining: usize },
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u32),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("handle not found: {0:#x}")]
    HandleNotFound(u64),
    #[error("no extension struct for sType {0}")]
    UnknownExtension(i64),
    #[error("value shape mismatch: {0}")]
    ValueShape(String),
}

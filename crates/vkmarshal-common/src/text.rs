//! Small text helpers shared by the generator and the CLI.

/// Banner written at the top of every generated file.
pub fn generated_banner(comment_prefix: &str, artifact: &str) -> String {
    format!(
        "{p} Autogenerated module {artifact}\n\
         {p} (impl) generated by vkmarshal from the Vulkan registry.\n\
         {p} Please do not modify directly; re-run the generator instead.\n",
        p = comment_prefix,
        artifact = artifact,
    )
}

/// Render `bytes` as rows of 16 space-separated hex pairs.
pub fn hex_rows(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            format!("{:08x}  {}", row * 16, hex.join(" "))
        })
        .collect()
}

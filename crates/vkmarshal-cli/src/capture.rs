use vkmarshal_common::text::hex_rows;
use vkmarshal_types::OpcodeTable;
use vkmarshal_wire::{split_packets, PacketHeader};

/// One line per packet of a captured command stream.
pub struct PacketSummary {
    pub offset: usize,
    pub header: PacketHeader,
    pub name: Option<String>,
    pub body: Vec<u8>,
}

/// Walk `buf` packet by packet. Returns the summaries and the number of
/// trailing bytes that do not form a whole packet.
pub fn summarize(buf: &[u8], opcodes: &OpcodeTable) -> (Vec<PacketSummary>, usize) {
    let (packets, consumed) = split_packets(buf);
    let mut offset = 0;
    let summaries = packets
        .into_iter()
        .map(|(header, body)| {
            let summary = PacketSummary {
                offset,
                header,
                name: opcodes.command(header.opcode).map(str::to_string),
                body: body.to_vec(),
            };
            offset += header.length as usize;
            summary
        })
        .collect();
    (summaries, buf.len() - consumed)
}

pub fn render(summary: &PacketSummary, hex: bool) -> Vec<String> {
    let mut lines = vec![format!(
        "{:08x}  {:>6}  {:<48} {} bytes",
        summary.offset,
        summary.header.opcode,
        summary.name.as_deref().unwrap_or("<unknown opcode>"),
        summary.header.length
    )];
    if hex {
        lines.extend(hex_rows(&summary.body).into_iter().map(|row| format!("    {row}")));
    }
    lines
}

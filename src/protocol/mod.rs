pub mod buffer;
pub mod esptool;
pub mod modbus;
pub mod tty;

/// Upper-case hex dump, 16 bytes per line once the frame gets long.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let lines: Vec<String> = bytes
        .chunks(16)
        .map(|chunk| chunk.iter().map(|b| format!("{b:02X}")).collect())
        .collect();
    if lines.len() > 1 {
        format!("\n{}", lines.join("\n"))
    } else {
        lines.concat()
    }
}

use crate::protocol::buffer::RingBuffer;

const TABLE: [u16; 2] = [0x0000, 0xA001];

/// Modbus CRC16 (init 0xFFFF, reflected polynomial 0xA001).
pub fn crc16(bytes: impl IntoIterator<Item = u8>) -> u16 {
    let mut crc = 0xFFFFu16;
    for byte in bytes {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            let lsb = usize::from(crc & 1);
            crc >>= 1;
            crc ^= TABLE[lsb];
        }
    }
    crc
}

/// CRC over at most `max` bytes consumed from `reader`. Callers pass a view
/// so the real cursor stays put.
pub fn crc16_buffer(reader: &mut RingBuffer, max: usize) -> u16 {
    let count = reader.len().min(max);
    crc16(std::iter::from_fn(|| reader.read_u8()).take(count))
}

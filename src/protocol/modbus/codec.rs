use super::{
    crc::crc16_buffer,
    frame::{Reply, Request},
    opcode::{self, PayloadKind},
    payload::Payload,
};
use crate::protocol::buffer::{ByteOrder, RingBuffer};

/// Framing used by [`super::ModbusSession`].
pub trait FrameCodec {
    /// Append the frame for `request` to `buf`. Returns false when it does
    /// not fit or the request is malformed.
    fn encode(&self, slave: u8, request: &Request, buf: &mut RingBuffer) -> bool;

    /// Take the first valid reply frame out of `buf`.
    fn decode(&self, buf: &mut RingBuffer) -> Option<Reply>;
}

/// Modbus RTU framing: header fields big-endian, CRC16 little-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtuCodec;

impl RtuCodec {
    /// Device-side counterpart of [`FrameCodec::decode`]: emit `reply` the
    /// way a slave puts it on the wire.
    pub fn encode_reply(&self, reply: &Reply, buf: &mut RingBuffer) -> bool {
        let start = buf.len();
        if !(buf.write_u8(reply.slave) && buf.write_u8(reply.opcode)) {
            return false;
        }

        if opcode::reply_has_attr(reply.opcode)
            && !(buf.write_u16(reply.address, ByteOrder::MsbFirst)
                && buf.write_u16(reply.len_or_val, ByteOrder::MsbFirst))
        {
            return false;
        }

        if opcode::reply_payload(reply.opcode).is_some() {
            let Some(payload) = reply.payload.as_ref() else {
                return false;
            };
            let written = if reply.is_error() {
                // exception code goes out without a byte-count prefix
                payload.raw().first().is_some_and(|code| buf.write_u8(*code))
            } else {
                payload.write_to(buf)
            };
            if !written {
                return false;
            }
        }

        append_crc(buf, start)
    }

    /// Parse one candidate frame (everything up to the CRC) from `reader`.
    fn parse_reply(reader: &mut RingBuffer) -> Option<Reply> {
        let slave = reader.read_u8()?;
        let op = reader.read_u8()?;
        if !opcode::is_supported(op) {
            return None;
        }

        let mut reply = Reply {
            slave,
            opcode: op,
            ..Default::default()
        };

        if opcode::reply_has_attr(op) {
            reply.address = reader.read_u16(ByteOrder::MsbFirst)?;
            reply.len_or_val = reader.read_u16(ByteOrder::MsbFirst)?;
        }

        if let Some(kind) = opcode::reply_payload(op) {
            reply.len_or_val = if opcode::is_error(op) {
                1
            } else {
                u16::from(reader.read_u8()?)
            };

            let elements = match kind {
                PayloadKind::Bits => usize::from(reply.len_or_val) * 8,
                PayloadKind::Registers => usize::from(reply.len_or_val) / 2,
            };
            let mut payload = Payload::with_length(kind, elements);
            let raw = payload.raw_mut();
            if reader.read(raw) != raw.len() {
                return None;
            }
            reply.payload = Some(payload);
        }

        Some(reply)
    }
}

impl FrameCodec for RtuCodec {
    fn encode(&self, slave: u8, request: &Request, buf: &mut RingBuffer) -> bool {
        let start = buf.len();
        let header = buf.write_u8(slave)
            && buf.write_u8(request.opcode())
            && buf.write_u16(request.address, ByteOrder::MsbFirst)
            && buf.write_u16(request.len_or_val(), ByteOrder::MsbFirst);
        if !header {
            return false;
        }

        if opcode::request_payload(request.opcode()).is_some() {
            match request.payload() {
                Some(payload) if payload.write_to(buf) => {}
                _ => return false,
            }
        }

        append_crc(buf, start)
    }

    fn decode(&self, buf: &mut RingBuffer) -> Option<Reply> {
        while !buf.is_empty() {
            let mut reader = buf.view();
            if let Some(reply) = Self::parse_reply(&mut reader) {
                let consumed = buf.len() - reader.len();
                if let Some(crc) = reader.read_u16(ByteOrder::LsbFirst) {
                    if crc16_buffer(&mut buf.view(), consumed) == crc {
                        buf.discard(consumed + 2);
                        return Some(reply);
                    }
                }
            }

            // slide one byte and try again from the new front
            if let Some(dropped) = buf.read_u8() {
                log::trace!("modbus: resync, dropped 0x{dropped:02X}");
            }
        }
        None
    }
}

/// Append the CRC of everything written after the first `start` buffered bytes.
fn append_crc(buf: &mut RingBuffer, start: usize) -> bool {
    let mut view = buf.view();
    view.discard(start);
    let crc = crc16_buffer(&mut view, usize::MAX);
    buf.write_u16(crc, ByteOrder::LsbFirst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::modbus::{crc::crc16, opcode::*};

    fn encode_request(slave: u8, request: &Request) -> Vec<u8> {
        let mut buf = RingBuffer::new(256);
        assert!(RtuCodec.encode(slave, request, &mut buf));
        buf.to_vec()
    }

    fn read_reply(op: u8, payload: Payload) -> Reply {
        Reply {
            slave: 1,
            opcode: op,
            address: 0,
            len_or_val: payload.raw().len() as u16,
            payload: Some(payload),
        }
    }

    fn round_trip(reply: &Reply) -> Reply {
        let mut buf = RingBuffer::new(256);
        assert!(RtuCodec.encode_reply(reply, &mut buf));
        let decoded = RtuCodec.decode(&mut buf).expect("decodes");
        assert!(buf.is_empty());
        decoded
    }

    #[test]
    fn test_encode_read_holding_registers() {
        let req = Request::new(READ_HOLDING_REGISTERS)
            .with_address(0)
            .with_length(2);
        assert_eq!(
            encode_request(1, &req),
            vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]
        );
    }

    #[test]
    fn test_encode_write_multiple_registers() {
        let mut req = Request::new(WRITE_MULTIPLE_REGISTERS)
            .with_address(0x0001)
            .with_length(2);
        let payload = req.payload_mut().unwrap();
        payload.set_register(0, 0x000A);
        payload.set_register(1, 0x0102);

        let bytes = encode_request(0x11, &req);
        assert_eq!(
            &bytes[..11],
            &[0x11, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
        assert_eq!(&bytes[11..], &crc16(bytes[..11].iter().copied()).to_le_bytes());
    }

    #[test]
    fn test_encode_write_single_coil() {
        let mut req = Request::new(WRITE_SINGLE_COIL).with_address(0x00AC);
        req.set_value(true);
        let bytes = encode_request(0x11, &req);
        assert_eq!(&bytes[..6], &[0x11, 0x05, 0x00, 0xAC, 0xFF, 0x00]);
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn test_encode_does_not_move_read_cursor() {
        let mut buf = RingBuffer::new(256);
        let req = Request::new(READ_INPUT_REGISTERS).with_length(1);
        assert!(RtuCodec.encode(7, &req, &mut buf));
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.read_u8(), Some(7));
    }

    #[test]
    fn test_encode_fails_when_buffer_too_small() {
        let mut buf = RingBuffer::new(7);
        let req = Request::new(READ_COILS).with_length(8);
        assert!(!RtuCodec.encode(1, &req, &mut buf));
    }

    #[test]
    fn test_round_trip_bit_replies() {
        for op in [READ_COILS, READ_DISCRETE_INPUTS] {
            for count in [0usize, 16, 2000] {
                let mut payload = Payload::with_length(PayloadKind::Bits, count);
                for i in (0..count).filter(|i| i % 7 == 0 || i + 1 == count) {
                    assert!(payload.set_bit(i, true));
                }
                let reply = read_reply(op, payload);
                let decoded = round_trip(&reply);
                assert_eq!(decoded, reply);
                assert_eq!(decoded.payload.as_ref().map(Payload::count), Some(count));
                if count > 0 {
                    let payload = decoded.payload.as_ref().unwrap();
                    assert_eq!(payload.bit(count - 1), Some(true));
                    assert_eq!(payload.bit(1), Some(false));
                }
            }
        }
    }

    #[test]
    fn test_encode_write_multiple_coils() {
        let mut req = Request::new(WRITE_MULTIPLE_COILS)
            .with_address(0x0013)
            .with_length(10);
        let payload = req.payload_mut().unwrap();
        for bit in [0, 2, 3, 9] {
            assert!(payload.set_bit(bit, true));
        }
        assert!(!payload.set_bit(16, true));

        let bytes = encode_request(0x11, &req);
        assert_eq!(
            &bytes[..9],
            &[0x11, 0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0x0D, 0x02]
        );
        assert_eq!(&bytes[9..], &crc16(bytes[..9].iter().copied()).to_le_bytes());
    }

    #[test]
    fn test_encode_write_multiple_coils_limits() {
        let empty = Request::new(WRITE_MULTIPLE_COILS).with_length(0);
        let bytes = encode_request(1, &empty);
        assert_eq!(&bytes[..7], &[0x01, 0x0F, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(bytes.len(), 9);

        let mut full = Request::new(WRITE_MULTIPLE_COILS).with_length(1968);
        full.payload_mut().unwrap().set_bit(1967, true);
        let bytes = encode_request(1, &full);
        assert_eq!(&bytes[4..7], &[0x07, 0xB0, 246]);
        assert_eq!(bytes[6 + 246], 0x80);
        assert_eq!(bytes.len(), 7 + 246 + 2);
    }

    #[test]
    fn test_round_trip_register_replies() {
        for op in [READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS] {
            for count in [0usize, 1, 6, 125] {
                let mut payload = Payload::with_length(PayloadKind::Registers, count);
                for i in 0..count {
                    payload.set_register(i, (i as u16).wrapping_mul(0x0101));
                }
                let reply = read_reply(op, payload);
                let decoded = round_trip(&reply);
                assert_eq!(decoded, reply);
                assert_eq!(decoded.payload.as_ref().map(Payload::count), Some(count));
            }
        }
    }

    #[test]
    fn test_round_trip_write_replies() {
        for (op, address, len_or_val) in [
            (WRITE_SINGLE_COIL, 0x00AC, COIL_ON),
            (WRITE_SINGLE_REGISTER, 0x0001, 0x0003),
            (WRITE_MULTIPLE_COILS, 0x0013, 0x000A),
            (WRITE_MULTIPLE_REGISTERS, 0x0001, 0x0006),
        ] {
            let reply = Reply {
                slave: 1,
                opcode: op,
                address,
                len_or_val,
                payload: None,
            };
            assert_eq!(round_trip(&reply), reply);
        }
    }

    #[test]
    fn test_round_trip_error_reply() {
        let reply = Reply {
            slave: 1,
            opcode: READ_HOLDING_REGISTERS | ERROR_MASK,
            address: 0,
            len_or_val: 1,
            payload: Some(Payload::Bits(vec![0x02])),
        };
        let mut buf = RingBuffer::new(16);
        assert!(RtuCodec.encode_reply(&reply, &mut buf));
        assert_eq!(buf.len(), 5);

        let decoded = RtuCodec.decode(&mut buf).unwrap();
        assert_eq!(decoded, reply);
        assert!(decoded.is_error());
        assert_eq!(decoded.exception_code(), Some(0x02));
    }

    #[test]
    fn test_decode_resyncs_past_garbage() {
        let mut payload = Payload::with_length(PayloadKind::Registers, 2);
        payload.set_register(0, 0x0005);
        payload.set_register(1, 0x00AB);
        let reply = read_reply(READ_HOLDING_REGISTERS, payload);

        let mut frame = RingBuffer::new(64);
        assert!(RtuCodec.encode_reply(&reply, &mut frame));
        let frame = frame.to_vec();

        let mut buf = RingBuffer::new(64);
        buf.write_u8(0xFF);
        buf.write(&frame);
        buf.write_u8(0x42);

        let decoded = RtuCodec.decode(&mut buf).unwrap();
        assert_eq!(decoded, reply);
        assert_eq!(buf.to_vec(), vec![0x42]);
    }

    #[test]
    fn test_decode_rejects_corrupted_frame() {
        let reply = Reply {
            slave: 1,
            opcode: WRITE_SINGLE_REGISTER,
            address: 1,
            len_or_val: 3,
            payload: None,
        };
        let mut buf = RingBuffer::new(16);
        assert!(RtuCodec.encode_reply(&reply, &mut buf));
        let mut bytes = buf.to_vec();
        bytes[4] ^= 0x01;

        let mut buf = RingBuffer::new(16);
        buf.write(&bytes);
        assert_eq!(RtuCodec.decode(&mut buf), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_truncated_frame_fails() {
        let mut buf = RingBuffer::new(16);
        buf.write(&[0x01, 0x03, 0x04, 0x00, 0x05]);
        assert_eq!(RtuCodec.decode(&mut buf), None);
        assert_eq!(RtuCodec.decode(&mut RingBuffer::new(4)), None);
    }
}

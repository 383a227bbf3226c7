use std::time::Duration;

use anyhow::Result;

use nas_screen::{
    api::{Monitor, NetworkStatus, StatusProvider, SystemStatus},
    protocol::{
        buffer::RingBuffer,
        modbus::{
            crc16,
            opcode::{READ_HOLDING_REGISTERS, WRITE_MULTIPLE_REGISTERS},
            ModbusSession, Payload, PayloadKind, Reply, Request, RtuCodec,
        },
        tty::MockTransport,
    },
};

fn encode_reply(reply: &Reply) -> Vec<u8> {
    let mut buf = RingBuffer::new(256);
    assert!(RtuCodec.encode_reply(reply, &mut buf));
    buf.to_vec()
}

fn holding(values: &[u16]) -> Vec<u8> {
    let mut payload = Payload::with_length(PayloadKind::Registers, values.len());
    for (i, v) in values.iter().enumerate() {
        payload.set_register(i, *v);
    }
    encode_reply(&Reply {
        slave: 1,
        opcode: READ_HOLDING_REGISTERS,
        address: 0,
        len_or_val: (values.len() * 2) as u16,
        payload: Some(payload),
    })
}

#[test]
fn test_read_holding_registers() -> Result<()> {
    let reply = holding(&[5, 171]);
    assert_eq!(
        reply,
        vec![0x01, 0x03, 0x04, 0x00, 0x05, 0x00, 0xAB, 0xAB, 0x8D]
    );
    let expected_crc = crc16(reply[..7].iter().copied());
    assert_eq!(reply[7..], expected_crc.to_le_bytes());

    let mock = MockTransport::with_responder(move |_| reply.clone());
    let handle = mock.handle();
    let mut session = ModbusSession::new(mock);
    session.open()?;

    let request = Request::new(READ_HOLDING_REGISTERS).with_length(2);
    let answer = session.exec(1, &request)?.expect("reply");
    assert_eq!(answer.register(0), Some(5));
    assert_eq!(answer.register(1), Some(171));
    assert_eq!(
        handle.writes(),
        vec![vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]]
    );

    session.close()?;
    assert!(!handle.is_open());
    Ok(())
}

#[test]
fn test_reply_behind_line_noise() -> Result<()> {
    let mock = MockTransport::with_responder(|_| {
        let mut wire = vec![0xFF, 0x00, 0xFF];
        wire.extend(holding(&[0x1234]));
        wire
    });
    let mut session = ModbusSession::new(mock);
    session.open()?;

    let request = Request::new(READ_HOLDING_REGISTERS).with_length(1);
    let answer = session.exec(1, &request)?.expect("reply");
    assert_eq!(answer.register(0), Some(0x1234));
    Ok(())
}

#[test]
fn test_corrupted_reply_is_dropped() -> Result<()> {
    let mock = MockTransport::with_responder(|_| {
        let mut wire = holding(&[7]);
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        wire
    });
    let mut session = ModbusSession::new(mock);
    session.open()?;

    let request = Request::new(READ_HOLDING_REGISTERS).with_length(1);
    assert!(session.exec(1, &request)?.is_none());
    Ok(())
}

#[test]
fn test_exception_reply() -> Result<()> {
    let mock = MockTransport::with_responder(|_| {
        encode_reply(&Reply {
            slave: 1,
            opcode: 0x83,
            address: 0,
            len_or_val: 1,
            payload: Some(Payload::Bits(vec![0x02])),
        })
    });
    let mut session = ModbusSession::new(mock);
    session.open()?;

    let request = Request::new(READ_HOLDING_REGISTERS).with_length(1);
    let answer = session.exec(1, &request)?.expect("reply");
    assert!(answer.is_error());
    assert_eq!(answer.exception_code(), Some(0x02));
    Ok(())
}

struct Router;

impl StatusProvider for Router {
    fn system_status(&self) -> Result<SystemStatus> {
        Ok(SystemStatus {
            cpu: 7,
            mem: 42,
            temp: 55,
        })
    }

    fn network_status(&self) -> Result<NetworkStatus> {
        Ok(NetworkStatus {
            peers: 9,
            up: 100,
            down: 0x4000 | 12,
        })
    }
}

#[tokio::test]
async fn test_monitor_writes_status_block() -> Result<()> {
    let mock = MockTransport::new();
    let handle = mock.handle();

    let monitor =
        Monitor::start_with_interval(ModbusSession::new(mock), Router, Duration::from_millis(15))?;
    tokio::time::sleep(Duration::from_millis(80)).await;
    let transport = monitor.stop().await?;
    assert!(!transport.handle().is_open());

    let writes = handle.writes();
    assert!(!writes.is_empty());
    let frame = &writes[0];
    assert_eq!(
        &frame[..7],
        &[0x01, WRITE_MULTIPLE_REGISTERS, 0x00, 0x01, 0x00, 0x06, 0x0C]
    );
    assert_eq!(
        &frame[7..19],
        &[0, 7, 0, 42, 0, 55, 0, 100, 0x40, 12, 0, 9]
    );
    assert_eq!(frame.len(), 21);
    Ok(())
}

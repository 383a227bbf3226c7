use std::{cmp::Ordering, collections::HashSet, thread, time::Duration};

use serialport::{SerialPortInfo, SerialPortType};

/// Product id of the ESP32-C3 built-in USB-Serial/JTAG controller.
pub const ESP_USB_JTAG_PID: u16 = 0x1001;

/// Return the list of available serial ports, USB/ACM first, deduped.
pub fn available_ports_sorted() -> Vec<SerialPortInfo> {
    let raw_ports = serialport::available_ports().unwrap_or_else(|err| {
        log::warn!("tty: failed to enumerate ports: {err}");
        Vec::new()
    });
    sort_and_dedup_ports(raw_ports)
}

/// First USB port in `ports` whose product id is `pid`.
pub fn find_usb_port(ports: &[SerialPortInfo], pid: u16) -> Option<&SerialPortInfo> {
    ports
        .iter()
        .find(|p| matches!(&p.port_type, SerialPortType::UsbPort(usb) if usb.pid == pid))
}

/// Block until a USB serial port with product id `pid` shows up, polling
/// every `poll`. Returns the port name.
pub fn wait_port(pid: u16, poll: Duration) -> String {
    loop {
        let ports = available_ports_sorted();
        if let Some(port) = find_usb_port(&ports, pid) {
            log::info!("tty: use port {}", port.port_name);
            return port.port_name.clone();
        }
        log::warn!("tty: waiting for a port with pid {pid:04x}");
        thread::sleep(poll);
    }
}

fn dedup_key(port: &SerialPortInfo) -> String {
    let base = port
        .port_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(&port.port_name)
        .to_lowercase();
    match &port.port_type {
        SerialPortType::UsbPort(usb) => format!("{base}:vid={:04x}:pid={:04x}", usb.vid, usb.pid),
        _ => base,
    }
}

fn priority(port: &SerialPortInfo) -> i32 {
    let n = port.port_name.to_lowercase();
    if matches!(port.port_type, SerialPortType::UsbPort(_)) || n.contains("ttyusb") {
        0
    } else if n.contains("acm") {
        1
    } else if n.contains("ttys") || n.contains("serial") || n.starts_with("com") {
        2
    } else {
        10
    }
}

fn com_index(name: &str) -> Option<u32> {
    name.to_uppercase().strip_prefix("COM")?.parse().ok()
}

pub(crate) fn sort_and_dedup_ports(raw_ports: Vec<SerialPortInfo>) -> Vec<SerialPortInfo> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut ports: Vec<SerialPortInfo> = raw_ports
        .into_iter()
        .filter(|p| seen.insert(dedup_key(p)))
        .collect();

    ports.sort_by(|a, b| {
        priority(a)
            .cmp(&priority(b))
            .then_with(|| match (com_index(&a.port_name), com_index(&b.port_name)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.port_name.cmp(&b.port_name),
            })
    });

    ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn plain(name: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::Unknown,
        }
    }

    fn usb(name: &str, pid: u16) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x303A,
                pid,
                serial_number: None,
                manufacturer: None,
                product: None,
            }),
        }
    }

    #[test]
    fn test_usb_and_acm_sort_first() {
        let out = sort_and_dedup_ports(vec![
            plain("/dev/ttyS1"),
            plain("/dev/ttyACM0"),
            usb("/dev/ttyUSB0", 0x7523),
            plain("/dev/ttyS0"),
        ]);
        let names: Vec<_> = out.iter().map(|p| p.port_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["/dev/ttyUSB0", "/dev/ttyACM0", "/dev/ttyS0", "/dev/ttyS1"]
        );
    }

    #[test]
    fn test_dedup_and_com_order() {
        let out = sort_and_dedup_ports(vec![
            plain("COM10"),
            plain("COM2"),
            plain("com2"),
            plain("COM1"),
        ]);
        let names: Vec<_> = out.iter().map(|p| p.port_name.to_uppercase()).collect();
        assert_eq!(names, vec!["COM1", "COM2", "COM10"]);
    }

    #[test]
    fn test_find_usb_port_by_pid() {
        let ports = vec![
            plain("/dev/ttyS0"),
            usb("/dev/ttyUSB0", 0x7523),
            usb("/dev/ttyACM0", ESP_USB_JTAG_PID),
        ];
        let found = find_usb_port(&ports, ESP_USB_JTAG_PID).map(|p| p.port_name.as_str());
        assert_eq!(found, Some("/dev/ttyACM0"));
        assert!(find_usb_port(&ports, 0x0001).is_none());
    }
}

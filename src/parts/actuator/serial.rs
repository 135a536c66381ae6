/**
 * Serial PWM Bridge
 *
 * Sends pulse widths to the microcontroller generating the PWM signals,
 * one framed `PwmPulse` message per write. The board answers with `Ack`
 * frames (and periodic heartbeats) which are drained after every write.
 */

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info, trace};

use super::{ActuatorError, PwmOutput};
use crate::uart::{encode_frame, AckMsg, FrameParser, MsgType, PwmPulseCmd};

const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Byte stream to the PWM board.
pub trait SerialLink: Read + Write + Send {
    /// Bytes that can be read without blocking.
    fn pending(&mut self) -> io::Result<usize>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn pending(&mut self) -> io::Result<usize> {
        self.bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }
}

pub struct SerialPwmBridge<L: SerialLink = Box<dyn SerialPort>> {
    link: L,
    parser: FrameParser,
    acks: u64,
    heartbeats: u64,
    last_ack: Option<AckMsg>,
}

impl SerialPwmBridge {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, ActuatorError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        info!(port = port_name, baud_rate, "pwm bridge connected");
        Ok(Self::with_link(port))
    }
}

impl<L: SerialLink> SerialPwmBridge<L> {
    pub fn with_link(link: L) -> Self {
        Self {
            link,
            parser: FrameParser::new(),
            acks: 0,
            heartbeats: 0,
            last_ack: None,
        }
    }

    pub fn acks(&self) -> u64 {
        self.acks
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats
    }

    pub fn last_ack(&self) -> Option<AckMsg> {
        self.last_ack
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn drain_replies(&mut self) -> Result<(), ActuatorError> {
        let pending = self.link.pending()?;
        if pending == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; pending];
        let n = self.link.read(&mut buf)?;
        self.parser.extend(&buf[..n]);

        while let Some(frame) = self.parser.next_frame() {
            match frame.msg_type {
                MsgType::Ack => {
                    self.acks += 1;
                    self.last_ack = AckMsg::from_bytes(&frame.payload);
                }
                MsgType::Heartbeat => {
                    self.heartbeats += 1;
                    trace!("pwm board heartbeat");
                }
                MsgType::PwmPulse => debug!("unexpected pulse frame from board"),
            }
        }
        Ok(())
    }
}

impl<L: SerialLink> PwmOutput for SerialPwmBridge<L> {
    fn set_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), ActuatorError> {
        let frame = encode_frame(MsgType::PwmPulse, &PwmPulseCmd::new(channel, pulse).to_bytes())?;
        self.link.write_all(&frame)?;
        self.link.flush()?;
        self.drain_replies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    //board that acknowledges every pulse it receives
    #[derive(Default)]
    struct LoopbackBoard {
        written: Vec<u8>,
        replies: VecDeque<u8>,
    }

    impl Read for LoopbackBoard {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.replies.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.replies.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    impl Write for LoopbackBoard {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            let mut parser = FrameParser::new();
            parser.extend(buf);
            if let Some(frame) = parser.next_frame() {
                let ack = encode_frame(MsgType::Ack, &frame.payload)?;
                self.replies.extend(ack);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for LoopbackBoard {
        fn pending(&mut self) -> io::Result<usize> {
            Ok(self.replies.len())
        }
    }

    #[test]
    fn writes_framed_pulse_and_counts_ack() {
        let mut bridge = SerialPwmBridge::with_link(LoopbackBoard::default());
        bridge.set_pulse(1, 460).unwrap();

        let mut parser = FrameParser::new();
        parser.extend(&bridge.link().written);
        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.msg_type, MsgType::PwmPulse);
        assert_eq!(PwmPulseCmd::from_bytes(&frame.payload), Some(PwmPulseCmd::new(1, 460)));

        assert_eq!(bridge.acks(), 1);
        assert_eq!(bridge.last_ack(), Some(AckMsg { channel: 1, pulse: 460 }));

        bridge.set_pulse(0, 370).unwrap();
        assert_eq!(bridge.acks(), 2);
        assert_eq!(bridge.heartbeats(), 0);
    }
}

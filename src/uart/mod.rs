pub mod protocol;
pub use protocol::*;

use std::io;

pub const SYNC_BYTE: u8 = 0xAA;
pub const MAX_MSG_SIZE: usize = 244;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType{
    Heartbeat = 0x04,
    Ack = 0x11,
    PwmPulse = 0x20,
}

impl MsgType{
    pub fn from_u8(val: u8) -> Option<Self>{
        match val{
            0x04 => Some(MsgType::Heartbeat),
            0x11 => Some(MsgType::Ack),
            0x20 => Some(MsgType::PwmPulse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartFrame{
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

pub fn calculate_checksum(data: &[u8]) -> u8{
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

//frame format: [SYNC][TYPE][LEN][PAYLOAD...][CHECKSUM]
//              0xAA  1byte 1byte  LEN bytes   1byte
pub fn encode_frame(msg_type: MsgType, payload: &[u8]) -> io::Result<Vec<u8>>{
    if payload.len() > MAX_MSG_SIZE{
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Payload too large"
        ));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(SYNC_BYTE);
    frame.push(msg_type as u8);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);

    let checksum = calculate_checksum(&frame[1..]);
    frame.push(checksum);
    Ok(frame)
}

//incremental decoder for bytes coming back from the PWM board
#[derive(Debug, Default)]
pub struct FrameParser{
    rx_buffer: Vec<u8>,
}

impl FrameParser{
    pub fn new() -> Self{
        FrameParser{ rx_buffer: Vec::with_capacity(512) }
    }

    pub fn extend(&mut self, bytes: &[u8]){
        self.rx_buffer.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize{
        self.rx_buffer.len()
    }

    //next complete frame, skipping garbage and corrupt frames
    pub fn next_frame(&mut self) -> Option<UartFrame>{
        loop{
            if self.rx_buffer.len() < 4{
                return None;
            }

            //find sync byte
            let Some(sync_pos) = self.rx_buffer.iter().position(|&b| b == SYNC_BYTE) else{
                self.rx_buffer.clear();
                return None;
            };
            if sync_pos > 0{
                self.rx_buffer.drain(0..sync_pos);
            }

            if self.rx_buffer.len() < 4{
                return None;
            }

            let msg_type_byte = self.rx_buffer[1];
            let len = self.rx_buffer[2] as usize;

            if len > MAX_MSG_SIZE{
                self.rx_buffer.remove(0);
                continue;
            }

            let frame_len = 4 + len; //sync + type + len + payload + checksum
            if self.rx_buffer.len() < frame_len{
                return None;
            }

            //verify checksum
            let checksum = self.rx_buffer[3 + len];
            let calculated = calculate_checksum(&self.rx_buffer[1..3 + len]);
            if checksum != calculated{
                self.rx_buffer.remove(0);
                continue;
            }

            let payload = self.rx_buffer[3..3 + len].to_vec();
            self.rx_buffer.drain(0..frame_len);

            match MsgType::from_u8(msg_type_byte){
                Some(msg_type) => return Some(UartFrame{ msg_type, payload }),
                None => continue, //well formed but unknown, drop it
            }
        }
    }
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_msg_type_conversion(){
        assert_eq!(MsgType::from_u8(0x20), Some(MsgType::PwmPulse));
        assert_eq!(MsgType::from_u8(0x11), Some(MsgType::Ack));
        assert_eq!(MsgType::from_u8(0xFF), None);
    }

    #[test]
    fn test_checksum(){
        let data = [0x01, 0x05, 0xAB, 0xCD];
        let checksum = calculate_checksum(&data);
        assert_eq!(checksum, 0x01u8.wrapping_add(0x05).wrapping_add(0xAB).wrapping_add(0xCD));
    }

    #[test]
    fn test_encode_frame_layout(){
        let frame = encode_frame(MsgType::PwmPulse, &[0x00, 0x72, 0x01]).unwrap();
        assert_eq!(frame[0], SYNC_BYTE);
        assert_eq!(frame[1], 0x20);
        assert_eq!(frame[2], 3);
        assert_eq!(&frame[3..6], &[0x00, 0x72, 0x01]);
        assert_eq!(frame[6], calculate_checksum(&frame[1..6]));
    }

    #[test]
    fn test_encode_rejects_oversized_payload(){
        let payload = vec![0u8; MAX_MSG_SIZE + 1];
        assert!(encode_frame(MsgType::PwmPulse, &payload).is_err());
    }

    #[test]
    fn test_parser_resyncs_after_garbage_and_bad_checksum(){
        let mut parser = FrameParser::new();
        let good = encode_frame(MsgType::Ack, &[0x01, 0xCC, 0x01]).unwrap();
        let mut corrupt = encode_frame(MsgType::Ack, &[0x00, 0x10, 0x00]).unwrap();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;

        parser.extend(&[0x00, 0x13, 0x37]);
        parser.extend(&corrupt);
        parser.extend(&good);

        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.msg_type, MsgType::Ack);
        assert_eq!(AckMsg::from_bytes(&frame.payload), Some(AckMsg{ channel: 1, pulse: 460 }));
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_parser_waits_for_partial_frame(){
        let mut parser = FrameParser::new();
        let frame = encode_frame(MsgType::Heartbeat, &[]).unwrap();
        parser.extend(&frame[..2]);
        assert!(parser.next_frame().is_none());
        parser.extend(&frame[2..]);
        let decoded = parser.next_frame().unwrap();
        assert_eq!(decoded.msg_type, MsgType::Heartbeat);
        assert!(decoded.payload.is_empty());
        assert_eq!(parser.buffered(), 0);
    }
}

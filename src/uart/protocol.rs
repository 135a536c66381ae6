//payloads carried inside uart frames, little endian on the wire

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PwmPulseCmd{
    pub channel: u8,
    pub pulse: u16,       //12-bit PWM tick count at 60Hz
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AckMsg{
    pub channel: u8,
    pub pulse: u16,       //pulse the board actually applied
}

//message sizes
pub const PWM_PULSE_CMD_SIZE: usize = 3;  //u8 + u16
pub const ACK_MSG_SIZE: usize = 3;        //u8 + u16

impl PwmPulseCmd{
    pub fn new(channel: u8, pulse: u16) -> Self{
        PwmPulseCmd{ channel, pulse }
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self>{
        if data.len() < PWM_PULSE_CMD_SIZE{
            return None;
        }
        Some(PwmPulseCmd{
            channel: data[0],
            pulse: u16::from_le_bytes([data[1], data[2]]),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8>{
        let mut bytes = Vec::with_capacity(PWM_PULSE_CMD_SIZE);
        bytes.push(self.channel);
        bytes.extend_from_slice(&self.pulse.to_le_bytes());
        bytes
    }
}

impl AckMsg{
    pub fn from_bytes(data: &[u8]) -> Option<Self>{
        if data.len() < ACK_MSG_SIZE{
            return None;
        }
        Some(AckMsg{
            channel: data[0],
            pulse: u16::from_le_bytes([data[1], data[2]]),
        })
    }
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_pwm_pulse_cmd_layout(){
        let cmd = PwmPulseCmd::new(1, 460);
        let bytes = cmd.to_bytes();
        assert_eq!(bytes.len(), PWM_PULSE_CMD_SIZE);
        assert_eq!(bytes, vec![0x01, 0xCC, 0x01]);

        let decoded = PwmPulseCmd::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn test_short_payload_rejected(){
        assert!(PwmPulseCmd::from_bytes(&[0x01, 0x02]).is_none());
        assert!(AckMsg::from_bytes(&[]).is_none());
    }
}

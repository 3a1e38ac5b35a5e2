//! Hardware wire protocol
//!
//! Trigger sensor telegrams: `+OCCH<channel>:<0|1>` lines.
//! Actuator commands: `AT+STACH<pin>=<0|1>\r\n`, fire-and-forget.

use bytes::Bytes;

use crate::ContractError;

/// Photoelectric level reported by the trigger sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerLevel {
    High,
    Low,
}

const TRIGGER_PREFIX: &[u8] = b"+OCCH";

/// Parse one trigger line.
///
/// Returns `Ok(None)` for a well-formed telegram on another channel.
///
/// # Errors
/// `MalformedFrame` for anything that is not a trigger telegram.
pub fn parse_trigger_line(line: &[u8], channel: u8) -> Result<Option<TriggerLevel>, ContractError> {
    let line = line.trim_ascii();
    let body = line.strip_prefix(TRIGGER_PREFIX).ok_or_else(|| {
        ContractError::malformed_frame(format!(
            "unexpected telegram '{}'",
            String::from_utf8_lossy(line)
        ))
    })?;

    let sep = body
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| ContractError::malformed_frame("missing ':' in trigger telegram"))?;
    let (ch, value) = (&body[..sep], &body[sep + 1..]);

    let ch: u8 = std::str::from_utf8(ch)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ContractError::malformed_frame("invalid trigger channel"))?;

    let level = match value {
        b"1" => TriggerLevel::High,
        b"0" => TriggerLevel::Low,
        other => {
            return Err(ContractError::malformed_frame(format!(
                "invalid trigger level '{}'",
                String::from_utf8_lossy(other)
            )))
        }
    };

    Ok((ch == channel).then_some(level))
}

/// One actuator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub pin: u16,
    pub engage: bool,
}

impl ActuatorCommand {
    pub fn engage(pin: u16) -> Self {
        Self { pin, engage: true }
    }

    pub fn release(pin: u16) -> Self {
        Self { pin, engage: false }
    }

    /// Wire encoding
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!(
            "AT+STACH{}={}\r\n",
            self.pin,
            if self.engage { 1 } else { 0 }
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!(
            parse_trigger_line(b"+OCCH1:1\r\n", 1).unwrap(),
            Some(TriggerLevel::High)
        );
        assert_eq!(
            parse_trigger_line(b"  +OCCH1:0", 1).unwrap(),
            Some(TriggerLevel::Low)
        );
    }

    #[test]
    fn test_other_channel_ignored() {
        assert_eq!(parse_trigger_line(b"+OCCH2:1", 1).unwrap(), None);
        assert_eq!(
            parse_trigger_line(b"+OCCH2:1", 2).unwrap(),
            Some(TriggerLevel::High)
        );
    }

    #[test]
    fn test_malformed() {
        for bad in [&b"OK"[..], b"+OCCH1", b"+OCCHx:1", b"+OCCH1:2", b"", b"+OCCH1:"] {
            let err = parse_trigger_line(bad, 1).unwrap_err();
            assert!(matches!(err, ContractError::MalformedFrame { .. }));
        }
    }

    #[test]
    fn test_command_encoding() {
        assert_eq!(&ActuatorCommand::engage(3).encode()[..], b"AT+STACH3=1\r\n");
        assert_eq!(&ActuatorCommand::release(12).encode()[..], b"AT+STACH12=0\r\n");
    }
}

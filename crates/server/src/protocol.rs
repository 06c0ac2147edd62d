//! Binary WebSocket protocol
//!
//! Every server message starts with a one-byte tag; all multi-byte fields
//! are little-endian. Client commands are two bytes: `0x80` then a command
//! code.
//!
//! | tag  | message     | layout after the tag |
//! |------|-------------|----------------------|
//! | 0x01 | SimInfo     | particle_count u32, box_min f32x3, box_max f32x3, particle_radius f32, smoothing_radius f32, backend u8 |
//! | 0x02 | Frame       | step u64, sim_time f64, count u32, then count × (x, y, z, density) f32 |
//! | 0x03 | Diagnostics | step u64, frame_time_ms f32, density_min f32, density_max f32, density_mean f32, unstable_total u32, colliders_dropped_total u32, particle_count u32 |
//! | 0x04 | SimStatus   | status u8, message_len u16, message utf8 |

use fluid_kernel::FluidParams;
use orchestrator::{FrameSnapshot, RunnerState, RunnerStatus};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Simulation description, sent once on connect
pub const TAG_SIM_INFO: u8 = 0x01;
/// Post-step particle frame
pub const TAG_FRAME: u8 = 0x02;
/// Counters and density statistics
pub const TAG_DIAGNOSTICS: u8 = 0x03;
/// Runner state change
pub const TAG_SIM_STATUS: u8 = 0x04;

/// Leading byte of every client command
pub const TAG_COMMAND: u8 = 0x80;

/// Pause the runner
pub const CMD_PAUSE: u8 = 0x01;
/// Resume the runner
pub const CMD_RESUME: u8 = 0x02;
/// Start sending diagnostics with each frame
pub const CMD_ENABLE_DIAGNOSTICS: u8 = 0x04;
/// Stop sending diagnostics
pub const CMD_DISABLE_DIAGNOSTICS: u8 = 0x05;

/// Bytes per particle in a frame
pub const FRAME_PARTICLE_BYTES: usize = 16;
/// Frame header size including the tag
pub const FRAME_HEADER_BYTES: usize = 1 + 8 + 8 + 4;

/// Decoded client command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Pause stepping
    Pause,
    /// Resume stepping
    Resume,
    /// Turn diagnostics on for this connection
    EnableDiagnostics,
    /// Turn diagnostics off for this connection
    DisableDiagnostics,
}

/// Malformed client command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Fewer than two bytes
    #[error("command too short: {0} bytes")]
    TooShort(usize),
    /// First byte is not the command tag
    #[error("unknown command tag: 0x{0:02x}")]
    UnknownTag(u8),
    /// Unrecognized command code
    #[error("unknown command: 0x{0:02x}")]
    UnknownCommand(u8),
}

/// Parse a client command
pub fn parse_command(data: &[u8]) -> Result<Command, ProtocolError> {
    let [tag, code, ..] = data else {
        return Err(ProtocolError::TooShort(data.len()));
    };
    if *tag != TAG_COMMAND {
        return Err(ProtocolError::UnknownTag(*tag));
    }
    match *code {
        CMD_PAUSE => Ok(Command::Pause),
        CMD_RESUME => Ok(Command::Resume),
        CMD_ENABLE_DIAGNOSTICS => Ok(Command::EnableDiagnostics),
        CMD_DISABLE_DIAGNOSTICS => Ok(Command::DisableDiagnostics),
        other => Err(ProtocolError::UnknownCommand(other)),
    }
}

/// Wire code for a runner state (0=Running, 1=Paused, 2=Finished, 3=Error)
///
/// `Created` is reported as running: the stream starts the runner on connect.
pub fn status_code(state: RunnerState) -> u8 {
    match state {
        RunnerState::Created | RunnerState::Running => 0,
        RunnerState::Paused => 1,
        RunnerState::Finished => 2,
        RunnerState::Error => 3,
    }
}

fn backend_code(backend: &str) -> u8 {
    match backend {
        "gpu" => 1,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

/// Build SimInfo message (tag 0x01)
pub fn encode_sim_info(params: &FluidParams, backend: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 4 + 24 + 8 + 1);
    buf.push(TAG_SIM_INFO);
    buf.extend_from_slice(&(params.particle_count() as u32).to_le_bytes());

    let half = params.half_extents();
    for v in (-half).to_array() {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    for v in half.to_array() {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    buf.extend_from_slice(&params.particle_radius.to_le_bytes());
    buf.extend_from_slice(&params.smoothing_radius.to_le_bytes());
    buf.push(backend_code(backend));
    buf
}

/// Build Frame message (tag 0x02)
pub fn encode_frame(frame: &FrameSnapshot) -> Vec<u8> {
    let n = frame.positions.len();
    let mut buf = Vec::with_capacity(FRAME_HEADER_BYTES + n * FRAME_PARTICLE_BYTES);

    buf.push(TAG_FRAME);
    buf.extend_from_slice(&frame.step.to_le_bytes());
    buf.extend_from_slice(&frame.sim_time.to_le_bytes());
    buf.extend_from_slice(&(n as u32).to_le_bytes());

    for (i, p) in frame.positions.iter().enumerate() {
        buf.extend_from_slice(&p.x.to_le_bytes());
        buf.extend_from_slice(&p.y.to_le_bytes());
        buf.extend_from_slice(&p.z.to_le_bytes());
        let density = frame.densities.get(i).copied().unwrap_or(0.0);
        buf.extend_from_slice(&density.to_le_bytes());
    }

    buf
}

/// Density min, max and mean over a frame (zeros for an empty frame)
pub fn density_stats(densities: &[f32]) -> (f32, f32, f32) {
    if densities.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let (min, max, sum) = densities.iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY, 0.0_f64),
        |(lo, hi, sum), &d| (lo.min(d), hi.max(d), sum + f64::from(d)),
    );
    (min, max, (sum / densities.len() as f64) as f32)
}

/// Build Diagnostics message (tag 0x03)
pub fn encode_diagnostics(
    status: &RunnerStatus,
    frame: Option<&FrameSnapshot>,
    frame_time_ms: f32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 8 + 4 * 7);
    buf.push(TAG_DIAGNOSTICS);
    buf.extend_from_slice(&status.step.to_le_bytes());
    buf.extend_from_slice(&frame_time_ms.to_le_bytes());

    let (min, max, mean) = frame.map_or((0.0, 0.0, 0.0), |f| density_stats(&f.densities));
    buf.extend_from_slice(&min.to_le_bytes());
    buf.extend_from_slice(&max.to_le_bytes());
    buf.extend_from_slice(&mean.to_le_bytes());

    let saturate = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);
    buf.extend_from_slice(&saturate(status.unstable_total).to_le_bytes());
    buf.extend_from_slice(&saturate(status.colliders_dropped_total).to_le_bytes());
    buf.extend_from_slice(&(status.particle_count as u32).to_le_bytes());
    buf
}

/// Build SimStatus message (tag 0x04)
///
/// Messages longer than `u16::MAX` bytes are truncated at a char boundary.
pub fn encode_sim_status(state: RunnerState, message: &str) -> Vec<u8> {
    let mut end = message.len().min(u16::MAX as usize);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    let msg = &message.as_bytes()[..end];

    let mut buf = Vec::with_capacity(4 + msg.len());
    buf.push(TAG_SIM_STATUS);
    buf.push(status_code(state));
    buf.extend_from_slice(&(msg.len() as u16).to_le_bytes());
    buf.extend_from_slice(msg);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(&[0x80, 0x01]), Ok(Command::Pause));
        assert_eq!(parse_command(&[0x80, 0x02, 0xff]), Ok(Command::Resume));
        assert_eq!(parse_command(&[0x80, 0x04]), Ok(Command::EnableDiagnostics));
        assert_eq!(parse_command(&[0x80, 0x05]), Ok(Command::DisableDiagnostics));
        assert_eq!(parse_command(&[0x80]), Err(ProtocolError::TooShort(1)));
        assert_eq!(parse_command(&[0x01, 0x01]), Err(ProtocolError::UnknownTag(0x01)));
        assert_eq!(parse_command(&[0x80, 0x03]), Err(ProtocolError::UnknownCommand(0x03)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(RunnerState::Created), 0);
        assert_eq!(status_code(RunnerState::Running), 0);
        assert_eq!(status_code(RunnerState::Paused), 1);
        assert_eq!(status_code(RunnerState::Finished), 2);
        assert_eq!(status_code(RunnerState::Error), 3);
    }

    #[test]
    fn test_density_stats() {
        assert_eq!(density_stats(&[]), (0.0, 0.0, 0.0));
        let (min, max, mean) = density_stats(&[1.0, 3.0, 2.0]);
        assert_eq!(min, 1.0);
        assert_eq!(max, 3.0);
        assert!((mean - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_status_message_truncated_on_char_boundary() {
        let long = "é".repeat(40_000);
        let buf = encode_sim_status(RunnerState::Error, &long);
        let len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        assert_eq!(buf.len(), 4 + len);
        assert!(len <= u16::MAX as usize);
        assert!(std::str::from_utf8(&buf[4..]).is_ok());
    }
}

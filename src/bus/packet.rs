// Feetech STS-series wheel servo protocol: frame building and decoding
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Length counts instruction + params + checksum bytes; the checksum is the
// bitwise complement of the byte sum from ID through the last parameter.

/// Packet header bytes
pub const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Broadcast address for sync writes (no servo responds)
pub const BROADCAST_ID: u8 = 0xFE;

/// Highest assignable servo ID
pub const MAX_MOTOR_ID: u8 = 253;

/// Minimum length of a decodable read response:
/// header (2) + id + length + status + two value bytes + checksum
pub const MIN_RESPONSE_LEN: usize = 8;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
    SyncWrite = 0x83,
}

/// Register addresses for the STS3215 wheel servos
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area (persists across power cycles)
    ModelNumber = 3, // 2 bytes, read-only
    Id = 5,          // 1 byte

    // RAM area (volatile)
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalVelocity = 46,    // 2 bytes, sign-magnitude
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
    PresentVelocity = 58, // 2 bytes, read-only, sign-magnitude
}

/// Operating modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
    Step = 3,
}

/// Checksum over a packet body (everything between the header and the
/// checksum byte itself)
pub fn checksum(body: &[u8]) -> u8 {
    let sum: u16 = body.iter().map(|&b| b as u16).sum();
    (!sum & 0xFF) as u8
}

/// Build a packet with header and checksum
fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let length = (params.len() + 2) as u8; // instruction + params + checksum
    let mut packet = Vec::with_capacity(6 + params.len());

    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push(length);
    packet.push(instruction as u8);
    packet.extend_from_slice(params);

    // Checksum over id, length, instruction, params
    let body = &packet[2..];
    packet.push(checksum(body));

    packet
}

/// Read-register request. Cannot fail for in-range inputs.
pub fn encode_read(id: u8, register: Register, count: u8) -> Vec<u8> {
    build_packet(id, Instruction::Read, &[register as u8, count])
}

/// Sync write: one broadcast frame carrying the same register for many
/// servos, so they all act together. Elicits no response.
///
/// Param layout: [register, bytes_per_servo, id1, data1..., id2, data2..., ...]
pub fn encode_sync_write_u16(register: Register, data: &[(u8, u16)]) -> Vec<u8> {
    let mut params = vec![register as u8, 2];
    for &(id, value) in data {
        params.push(id);
        params.extend_from_slice(&value.to_le_bytes());
    }
    build_packet(BROADCAST_ID, Instruction::SyncWrite, &params)
}

/// Sync write for 1-byte registers (torque enable, operating mode)
pub fn encode_sync_write_u8(register: Register, data: &[(u8, u8)]) -> Vec<u8> {
    let mut params = vec![register as u8, 1];
    for &(id, value) in data {
        params.push(id);
        params.push(value);
    }
    build_packet(BROADCAST_ID, Instruction::SyncWrite, &params)
}

/// Sync write signed velocities (sign-magnitude on the wire)
pub fn encode_sync_write_i16(register: Register, data: &[(u8, i16)]) -> Vec<u8> {
    let encoded: Vec<(u8, u16)> = data
        .iter()
        .map(|&(id, value)| (id, encode_sign_magnitude(value)))
        .collect();
    encode_sync_write_u16(register, &encoded)
}

/// Decode a 2-byte register read response expected from `expected_id`.
///
/// Anything malformed decodes to `None`: buffer shorter than the minimum
/// response, missing header, echoed ID not the requested target, length byte
/// not matching the frame, or checksum mismatch. A garbled frame is
/// indistinguishable from silence at this layer.
pub fn decode_register(raw: &[u8], expected_id: u8) -> Option<(u8, u16)> {
    if raw.len() < MIN_RESPONSE_LEN {
        return None;
    }
    if raw[..2] != HEADER {
        return None;
    }
    let id = raw[2];
    if id != expected_id {
        return None;
    }

    // Length counts status + params + checksum; the full frame adds the
    // header, id, and length bytes. Trailing noise past the frame is ignored.
    let frame_len = 4 + raw[3] as usize;
    if frame_len < MIN_RESPONSE_LEN || raw.len() < frame_len {
        return None;
    }
    if checksum(&raw[2..frame_len - 1]) != raw[frame_len - 1] {
        return None;
    }

    Some((id, u16::from_le_bytes([raw[5], raw[6]])))
}

/// Encode a signed value to the servo's sign-magnitude format.
/// Bit 15 = direction (1 = negative), bits 0-14 = magnitude.
pub fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | value.unsigned_abs()
    }
}

/// Decode sign-magnitude format to a signed value
pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Well-formed read response carrying a 2-byte little-endian value
    fn response(id: u8, value: u16) -> Vec<u8> {
        let [lo, hi] = value.to_le_bytes();
        let mut frame = vec![0xFF, 0xFF, id, 4, 0, lo, hi];
        frame.push(checksum(&frame[2..]));
        frame
    }

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let body = [1u8, 4, 0x03, 30, 0, 2];
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum(&body), 215);
    }

    #[test]
    fn test_encode_read_layout() {
        let packet = encode_read(3, Register::ModelNumber, 2);
        // Header (2) + ID + Length + Instruction + 2 params + Checksum = 8
        assert_eq!(packet.len(), 8);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], 3); // ID
        assert_eq!(packet[3], 4); // instruction + addr + count + checksum
        assert_eq!(packet[4], Instruction::Read as u8);
        assert_eq!(packet[5], Register::ModelNumber as u8);
        assert_eq!(packet[6], 2);
        // ~(3+4+2+3+2) = 241
        assert_eq!(packet[7], 241);
    }

    #[test]
    fn test_encode_checksum_round_trip() {
        for id in [1u8, 7, 9, 120, 253] {
            let packet = encode_read(id, Register::PresentVelocity, 2);
            let last = packet.len() - 1;
            assert_eq!(packet[last], checksum(&packet[2..last]));
        }
    }

    #[test]
    fn test_decode_valid_response() {
        // STS3215 reports model 777
        let frame = response(3, 777);
        assert_eq!(decode_register(&frame, 3), Some((3, 777)));
    }

    #[test]
    fn test_decode_ignores_trailing_noise() {
        let mut frame = response(5, 777);
        frame.extend_from_slice(&[0xAA, 0x55]);
        assert_eq!(decode_register(&frame, 5), Some((5, 777)));
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert_eq!(decode_register(&[], 3), None);
        assert_eq!(decode_register(&[0xFF, 0xFF, 3], 3), None);
        let frame = response(3, 777);
        assert_eq!(decode_register(&frame[..7], 3), None);
    }

    #[test]
    fn test_decode_rejects_bad_header() {
        let mut frame = response(3, 777);
        frame[1] = 0x00;
        assert_eq!(decode_register(&frame, 3), None);
    }

    #[test]
    fn test_decode_rejects_wrong_id() {
        // A reply from servo 4 must not be attributed to servo 3
        let frame = response(4, 777);
        assert_eq!(decode_register(&frame, 3), None);
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let mut frame = response(3, 777);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(decode_register(&frame, 3), None);
    }

    #[test]
    fn test_decode_rejects_truncated_frame() {
        // Length byte claims more bytes than the buffer holds
        let mut frame = response(3, 777);
        frame[3] = 10;
        assert_eq!(decode_register(&frame, 3), None);
    }

    #[test]
    fn test_sync_write_layout() {
        let packet = encode_sync_write_i16(Register::GoalVelocity, &[(7, 600), (8, 0), (9, -600)]);
        assert_eq!(packet[2], BROADCAST_ID);
        assert_eq!(packet[4], Instruction::SyncWrite as u8);
        assert_eq!(packet[5], Register::GoalVelocity as u8);
        assert_eq!(packet[6], 2); // bytes per servo
        // 600 = 0x0258, -600 = 0x8258 sign-magnitude, little-endian
        assert_eq!(&packet[7..10], &[7, 0x58, 0x02]);
        assert_eq!(&packet[10..13], &[8, 0x00, 0x00]);
        assert_eq!(&packet[13..16], &[9, 0x58, 0x82]);
        let last = packet.len() - 1;
        assert_eq!(packet[last], checksum(&packet[2..last]));
    }

    #[test]
    fn test_sign_magnitude_encoding() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(-1), 0x8001);

        assert_eq!(decode_sign_magnitude(0), 0);
        assert_eq!(decode_sign_magnitude(100), 100);
        assert_eq!(decode_sign_magnitude(0x8064), -100);
        assert_eq!(decode_sign_magnitude(0x8001), -1);
    }
}

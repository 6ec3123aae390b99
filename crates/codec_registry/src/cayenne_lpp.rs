use crate::decoder::Decoder;
use crate::error::{CodecError, CodecResult};
use serde_json::{json, Map, Value};

/// Built-in decoder for the Cayenne Low Power Payload format.
///
/// Covers the standard sensor types; vector types (accelerometer,
/// gyrometer, GPS) are flattened into per-axis fields so the output
/// stays a flat map.
pub struct CayenneLppDecoder;

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let end = self.offset + n;
        if end > self.bytes.len() {
            return Err(CodecError::DecodeFailed(format!(
                "truncated payload at byte {}",
                self.offset
            )));
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16_be(&mut self) -> CodecResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16_be(&mut self) -> CodecResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i24_be(&mut self) -> CodecResult<i32> {
        let b = self.take(3)?;
        let raw = ((b[0] as i32) << 16) | ((b[1] as i32) << 8) | b[2] as i32;
        // Sign-extend from 24 bits
        Ok((raw << 8) >> 8)
    }

    fn done(&self) -> bool {
        self.offset >= self.bytes.len()
    }
}

impl Decoder for CayenneLppDecoder {
    fn decode(&self, payload: &[u8]) -> CodecResult<Map<String, Value>> {
        let mut cursor = Cursor {
            bytes: payload,
            offset: 0,
        };
        let mut fields = Map::new();

        while !cursor.done() {
            let channel = cursor.u8()?;
            let type_id = cursor.u8()?;

            match type_id {
                0x00 => {
                    fields.insert(format!("digital_in_{channel}"), json!(cursor.u8()?));
                }
                0x01 => {
                    fields.insert(format!("digital_out_{channel}"), json!(cursor.u8()?));
                }
                0x02 => {
                    let value = cursor.i16_be()? as f64 / 100.0;
                    fields.insert(format!("analog_in_{channel}"), json!(value));
                }
                0x03 => {
                    let value = cursor.i16_be()? as f64 / 100.0;
                    fields.insert(format!("analog_out_{channel}"), json!(value));
                }
                0x65 => {
                    fields.insert(format!("illuminance_{channel}"), json!(cursor.u16_be()?));
                }
                0x66 => {
                    fields.insert(format!("presence_{channel}"), json!(cursor.u8()?));
                }
                0x67 => {
                    let value = cursor.i16_be()? as f64 / 10.0;
                    fields.insert(format!("temperature_{channel}"), json!(value));
                }
                0x68 => {
                    let value = cursor.u8()? as f64 / 2.0;
                    fields.insert(format!("humidity_{channel}"), json!(value));
                }
                0x71 => {
                    for axis in ["x", "y", "z"] {
                        let value = cursor.i16_be()? as f64 / 1000.0;
                        fields.insert(format!("accelerometer_{channel}_{axis}"), json!(value));
                    }
                }
                0x73 => {
                    let value = cursor.u16_be()? as f64 / 10.0;
                    fields.insert(format!("barometer_{channel}"), json!(value));
                }
                0x86 => {
                    for axis in ["x", "y", "z"] {
                        let value = cursor.i16_be()? as f64 / 100.0;
                        fields.insert(format!("gyrometer_{channel}_{axis}"), json!(value));
                    }
                }
                0x88 => {
                    let latitude = cursor.i24_be()? as f64 / 10000.0;
                    let longitude = cursor.i24_be()? as f64 / 10000.0;
                    let altitude = cursor.i24_be()? as f64 / 100.0;
                    fields.insert(format!("gps_{channel}_latitude"), json!(latitude));
                    fields.insert(format!("gps_{channel}_longitude"), json!(longitude));
                    fields.insert(format!("gps_{channel}_altitude"), json!(altitude));
                }
                other => {
                    return Err(CodecError::DecodeFailed(format!(
                        "unsupported data type 0x{other:02x} on channel {channel}"
                    )));
                }
            }
        }

        Ok(fields)
    }
}

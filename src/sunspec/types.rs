use serde::{Deserialize, Serialize};

use super::SunSpecError;

/// SunSpec point types as used in model definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointType {
    Int16,
    Uint16,
    Count,
    Acc16,
    Enum16,
    Bitfield16,
    Pad,
    Sunssf,
    Int32,
    Uint32,
    Acc32,
    Enum32,
    Bitfield32,
    Ipaddr,
    Float32,
    #[serde(rename = "string")]
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    R,
    Rw,
}

/// Decoded value of a point. Absent values (unimplemented on the device) are
/// represented by `None` at the point level.
#[derive(Debug, Clone, PartialEq)]
pub enum PointValue {
    Integer(i64),
    Float(f32),
    Text(String),
}

impl PointValue {
    pub fn as_i64(&self) -> Option<i64> {
        return match self {
            PointValue::Integer(v) => Some(*v),
            _ => None,
        };
    }

    pub fn as_f64(&self) -> Option<f64> {
        return match self {
            PointValue::Integer(v) => Some(*v as f64),
            PointValue::Float(v) => Some(*v as f64),
            PointValue::Text(_) => None,
        };
    }

    pub fn as_str(&self) -> Option<&str> {
        return match self {
            PointValue::Text(s) => Some(s.as_str()),
            _ => None,
        };
    }
}

impl From<i64> for PointValue {
    fn from(v: i64) -> Self {
        PointValue::Integer(v)
    }
}

impl From<f32> for PointValue {
    fn from(v: f32) -> Self {
        PointValue::Float(v)
    }
}

impl From<&str> for PointValue {
    fn from(v: &str) -> Self {
        PointValue::Text(v.to_string())
    }
}

impl From<String> for PointValue {
    fn from(v: String) -> Self {
        PointValue::Text(v)
    }
}

/// Character encoding of string points. The device signs string data in this
/// encoding, so everything derived from it has to stay in the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "iso-8859-1", alias = "latin1", alias = "latin-1", alias = "ISO-8859-1")]
    Latin1,
}

impl TextEncoding {
    /// Name for XML declarations (upper-case as XML specs write them).
    pub fn xml_name(&self) -> &'static str {
        return match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Latin1 => "ISO-8859-1",
        };
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, SunSpecError> {
        return match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| SunSpecError::Encoding(format!("invalid UTF-8: {e}"))),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|b| *b as char).collect()),
        };
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>, SunSpecError> {
        return match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(c).map_err(|_| {
                        SunSpecError::Encoding(format!("{c:?} is not representable in ISO-8859-1"))
                    })
                })
                .collect(),
        };
    }
}

impl PointType {
    pub fn fixed_len(&self) -> Option<u16> {
        // strings take their length from the definition
        return match self {
            PointType::Text => None,
            PointType::Int32
            | PointType::Uint32
            | PointType::Acc32
            | PointType::Enum32
            | PointType::Bitfield32
            | PointType::Ipaddr
            | PointType::Float32 => Some(2),
            _ => Some(1),
        };
    }

    pub fn unimplemented(&self) -> u32 {
        return match self {
            PointType::Int16 | PointType::Sunssf | PointType::Pad => 0x8000,
            PointType::Uint16 | PointType::Count | PointType::Enum16 | PointType::Bitfield16 => 0xFFFF,
            PointType::Acc16 | PointType::Acc32 | PointType::Ipaddr | PointType::Text => 0,
            PointType::Int32 => 0x8000_0000,
            PointType::Uint32 | PointType::Enum32 | PointType::Bitfield32 => 0xFFFF_FFFF,
            PointType::Float32 => 0x7FC0_0000,
        };
    }

    /// Decodes the registers of one point. Sentinel values collapse to `None`.
    pub fn decode(&self, regs: &[u16], encoding: TextEncoding) -> Result<Option<PointValue>, SunSpecError> {
        if let Some(len) = self.fixed_len() {
            if regs.len() < len as usize {
                return Err(SunSpecError::ShortRead { address: 0, expected: len as usize, actual: regs.len() });
            }
        }

        match self {
            PointType::Pad => return Ok(None),
            PointType::Text => {
                let bytes = registers_to_bytes(regs);
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                if end == 0 {
                    return Ok(None);
                }
                return Ok(Some(PointValue::Text(encoding.decode(&bytes[..end])?)));
            }
            PointType::Float32 => {
                let raw = (regs[0] as u32) << 16 | regs[1] as u32;
                let value = f32::from_bits(raw);
                if value.is_nan() {
                    return Ok(None);
                }
                return Ok(Some(PointValue::Float(value)));
            }
            _ => {}
        }

        let raw: u32 = match self.fixed_len() {
            Some(2) => (regs[0] as u32) << 16 | regs[1] as u32,
            _ => regs[0] as u32,
        };

        if raw == self.unimplemented() {
            return Ok(None);
        }

        let value = match self {
            PointType::Int16 | PointType::Sunssf => raw as u16 as i16 as i64,
            PointType::Int32 => raw as i32 as i64,
            _ => raw as i64,
        };

        return Ok(Some(PointValue::Integer(value)));
    }

    /// Encodes a value into `len` registers. `None` encodes the sentinel.
    pub fn encode(&self, value: Option<&PointValue>, len: u16, encoding: TextEncoding) -> Result<Vec<u16>, SunSpecError> {
        match self {
            PointType::Text => {
                let mut bytes = match value {
                    None => Vec::new(),
                    Some(PointValue::Text(s)) => encoding.encode(s)?,
                    Some(_) => return Err(SunSpecError::TypeMismatch(*self)),
                };
                let size = len as usize * 2;
                if bytes.len() > size {
                    return Err(SunSpecError::ValueOutOfRange(*self));
                }
                bytes.resize(size, 0);
                return Ok(bytes_to_registers(&bytes));
            }
            PointType::Float32 => {
                let bits = match value {
                    None => self.unimplemented(),
                    Some(PointValue::Float(f)) => f.to_bits(),
                    Some(PointValue::Integer(i)) => (*i as f32).to_bits(),
                    Some(_) => return Err(SunSpecError::TypeMismatch(*self)),
                };
                return Ok(vec![(bits >> 16) as u16, bits as u16]);
            }
            _ => {}
        }

        let raw: u32 = match value {
            None => self.unimplemented(),
            Some(PointValue::Integer(v)) => self.integer_to_raw(*v)?,
            Some(_) => return Err(SunSpecError::TypeMismatch(*self)),
        };

        return match self.fixed_len() {
            Some(2) => Ok(vec![(raw >> 16) as u16, raw as u16]),
            _ => Ok(vec![raw as u16]),
        };
    }

    fn integer_to_raw(&self, v: i64) -> Result<u32, SunSpecError> {
        let out_of_range = SunSpecError::ValueOutOfRange(*self);
        return match self {
            PointType::Int16 | PointType::Sunssf | PointType::Pad => {
                i16::try_from(v).map(|x| x as u16 as u32).map_err(|_| out_of_range)
            }
            PointType::Int32 => i32::try_from(v).map(|x| x as u32).map_err(|_| out_of_range),
            PointType::Uint16 | PointType::Count | PointType::Acc16 | PointType::Enum16 | PointType::Bitfield16 => {
                u16::try_from(v).map(|x| x as u32).map_err(|_| out_of_range)
            }
            _ => u32::try_from(v).map_err(|_| out_of_range),
        };
    }
}

pub fn registers_to_bytes(regs: &[u16]) -> Vec<u8> {
    return regs.iter().flat_map(|r| r.to_be_bytes()).collect();
}

/// Big-endian registers from bytes, an odd trailing byte is padded with zero.
pub fn bytes_to_registers(bytes: &[u8]) -> Vec<u16> {
    return bytes
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
        .collect();
}

use std::collections::BTreeMap;

/// A bencoded value: integer, byte string, list or dictionary.
#[derive(PartialEq, Debug, Clone)]
pub enum Bencode {
    BNumber(i64),
    BString(Vec<u8>),
    BList(Vec<Bencode>),
    BDict(BTreeMap<Vec<u8>, Bencode>),
}

/// Posible `Bencode` decoding errors.
#[derive(PartialEq, Debug)]
pub enum BencodeError {
    UnexpectedEnd,
    UnexpectedByte(u8),
    InvalidNumber,
    InvalidStringLength,
    InvalidDictKey,
}

pub trait ToBencode {
    fn to_bencode(&self) -> Bencode;
}

impl ToBencode for String {
    fn to_bencode(&self) -> Bencode {
        Bencode::BString(self.as_bytes().to_vec())
    }
}

impl ToBencode for i64 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber(*self)
    }
}

impl ToBencode for u64 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber((*self) as i64)
    }
}

impl ToBencode for u32 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber((*self).into())
    }
}

impl ToBencode for u16 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber((*self).into())
    }
}

impl ToBencode for i32 {
    fn to_bencode(&self) -> Bencode {
        Bencode::BNumber((*self).into())
    }
}

impl ToBencode for Vec<u8> {
    fn to_bencode(&self) -> Bencode {
        Bencode::BString(self.clone())
    }
}

impl ToBencode for BTreeMap<Vec<u8>, Bencode> {
    fn to_bencode(&self) -> Bencode {
        Bencode::BDict(self.clone())
    }
}

impl<T: ToBencode> ToBencode for Vec<T> {
    fn to_bencode(&self) -> Bencode {
        Bencode::BList(self.iter().map(|v| v.to_bencode()).collect())
    }
}

impl ToBencode for Bencode {
    fn to_bencode(&self) -> Bencode {
        self.clone()
    }
}

impl Bencode {
    /// Decodes a bencoded byte slice into a `Bencode` value.
    ///
    /// Bytes after the first complete value are ignored.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bencoder::bencode::Bencode;
    ///
    /// let bencode = Bencode::decode(b"3:foo").unwrap();
    /// assert_eq!(bencode, Bencode::BString(b"foo".to_vec()));
    ///
    /// let bencode = Bencode::decode(b"i-42e").unwrap();
    /// assert_eq!(bencode, Bencode::BNumber(-42));
    /// ```
    pub fn decode(data: &[u8]) -> Result<Bencode, BencodeError> {
        Decoder::new(data).parse_value()
    }

    /// Encodes any `ToBencode` value into bencoded bytes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bencoder::bencode::Bencode;
    ///
    /// assert_eq!(Bencode::encode(&String::from("spam")), b"4:spam");
    /// assert_eq!(Bencode::encode(&123), b"i123e");
    /// ```
    pub fn encode(value: &dyn ToBencode) -> Vec<u8> {
        let mut out = Vec::new();
        value.to_bencode().write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Bencode::BNumber(n) => {
                out.push(b'i');
                out.extend(n.to_string().into_bytes());
                out.push(b'e');
            }
            Bencode::BString(s) => {
                out.extend(s.len().to_string().into_bytes());
                out.push(b':');
                out.extend_from_slice(s);
            }
            Bencode::BList(values) => {
                out.push(b'l');
                for value in values {
                    value.write_to(out);
                }
                out.push(b'e');
            }
            Bencode::BDict(dict) => {
                out.push(b'd');
                for (key, value) in dict {
                    Bencode::BString(key.clone()).write_to(out);
                    value.write_to(out);
                }
                out.push(b'e');
            }
        }
    }
}

/// Cursor over the input bytes. Every read is bounds checked so truncated
/// input surfaces as `UnexpectedEnd` instead of a panic.
struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEnd)
    }

    fn advance(&mut self) -> Result<u8, BencodeError> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn parse_value(&mut self) -> Result<Bencode, BencodeError> {
        match self.peek()? {
            b'i' => self.parse_number(),
            b'l' => self.parse_list(),
            b'd' => self.parse_dict(),
            b'0'..=b'9' => Ok(Bencode::BString(self.parse_string()?)),
            other => Err(BencodeError::UnexpectedByte(other)),
        }
    }

    fn parse_number(&mut self) -> Result<Bencode, BencodeError> {
        self.advance()?; // 'i'
        let start = self.pos;
        while self.peek()? != b'e' {
            self.pos += 1;
        }
        let digits =
            std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| BencodeError::InvalidNumber)?;
        let number = digits.parse::<i64>().map_err(|_| BencodeError::InvalidNumber)?;
        self.advance()?; // 'e'
        Ok(Bencode::BNumber(number))
    }

    fn parse_string(&mut self) -> Result<Vec<u8>, BencodeError> {
        let start = self.pos;
        while self.peek()? != b':' {
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| BencodeError::InvalidStringLength)?;
        let length = digits
            .parse::<usize>()
            .map_err(|_| BencodeError::InvalidStringLength)?;
        self.advance()?; // ':'
        if length > self.data.len() - self.pos {
            return Err(BencodeError::UnexpectedEnd);
        }
        let string = self.data[self.pos..self.pos + length].to_vec();
        self.pos += length;
        Ok(string)
    }

    fn parse_list(&mut self) -> Result<Bencode, BencodeError> {
        self.advance()?; // 'l'
        let mut values = Vec::new();
        while self.peek()? != b'e' {
            values.push(self.parse_value()?);
        }
        self.advance()?; // 'e'
        Ok(Bencode::BList(values))
    }

    fn parse_dict(&mut self) -> Result<Bencode, BencodeError> {
        self.advance()?; // 'd'
        let mut dict = BTreeMap::new();
        while self.peek()? != b'e' {
            let key = match self.parse_value()? {
                Bencode::BString(key) => key,
                _ => return Err(BencodeError::InvalidDictKey),
            };
            let value = self.parse_value()?;
            dict.insert(key, value);
        }
        self.advance()?; // 'e'
        Ok(Bencode::BDict(dict))
    }
}

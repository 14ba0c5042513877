//! Streaming codec for the assertion wire format.
//!
//! An encoded assertion is a block of `name: value` header lines, a blank
//! line, the body bytes (exactly `body-length` of them, present only when
//! the length is non-zero) followed by a blank-line separator, and finally
//! the armored signature block terminated by a newline. Bundles are
//! assertions separated by blank lines.
//!
//! Decoding is strict: a malformed assertion is a terminal error for the
//! stream, the decoder never resynchronizes past it. Decoding then
//! re-encoding reproduces the input byte for byte.

use bytes::Bytes;
use std::io::{BufRead, Read, Write};

use crate::assertion::{
    valid_header_name, Assertion, Headers, AUTHORITY_ID_HEADER, BODY_LENGTH_HEADER,
    REVISION_HEADER, SIGN_KEY_ID_HEADER, TYPE_HEADER,
};
use crate::error::WireError;
use crate::registry::TypeRegistry;

/// Streaming decoder reading assertions one at a time from a reader.
pub struct Decoder<'r, R: BufRead> {
    reader: R,
    registry: &'r TypeRegistry,
}

impl<'r, R: BufRead> Decoder<'r, R> {
    pub fn new(reader: R, registry: &'r TypeRegistry) -> Self {
        Self { reader, registry }
    }

    /// Decode the next assertion, or `None` at a clean end of stream.
    pub fn decode(&mut self) -> Result<Option<Assertion>, WireError> {
        // Skip blank separator lines between bundle entries.
        let first = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };

        // Header block, terminated by a blank line. The type header must
        // come first.
        let mut headers = Headers::new();
        parse_header_line(&first, &mut headers)?;
        if !headers.contains(TYPE_HEADER) {
            return Err(WireError::MissingHeader(TYPE_HEADER));
        }
        loop {
            match self.read_line()? {
                None => return Err(WireError::MissingSeparator),
                Some(line) if line.is_empty() => break,
                Some(line) => parse_header_line(&line, &mut headers)?,
            }
        }

        let type_name = headers.get(TYPE_HEADER).unwrap_or_default().to_string();
        if !valid_header_name(&type_name) {
            return Err(WireError::InvalidType(type_name));
        }
        for required in [AUTHORITY_ID_HEADER, SIGN_KEY_ID_HEADER] {
            if !headers.contains(required) {
                return Err(WireError::MissingHeader(required));
            }
        }
        // An absent body-length means no body section.
        let body_length: usize = match headers.get(BODY_LENGTH_HEADER) {
            None => 0,
            Some(v) => v.parse().map_err(|_| WireError::BodyLength(v.to_string()))?,
        };
        let revision: u32 = match headers.get(REVISION_HEADER) {
            None => 0,
            Some(v) => v.parse().map_err(|_| WireError::Revision(v.to_string()))?,
        };

        // Body: exactly body-length raw bytes, then a blank-line separator.
        let body = if body_length > 0 {
            let mut body = vec![0u8; body_length];
            self.reader
                .read_exact(&mut body)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => WireError::BodyTruncated {
                        declared: body_length,
                    },
                    _ => WireError::Io(e),
                })?;
            for _ in 0..2 {
                match self.read_line()? {
                    Some(line) if line.is_empty() => {}
                    _ => return Err(WireError::MissingSeparator),
                }
            }
            Bytes::from(body)
        } else {
            Bytes::new()
        };

        // Signature block: lines until a blank line or EOF.
        let mut signature_lines = Vec::new();
        loop {
            match self.read_line()? {
                None => break,
                Some(line) if line.is_empty() => break,
                Some(line) => signature_lines.push(line),
            }
        }
        if signature_lines.is_empty() {
            return Err(WireError::EmptySignature);
        }
        let signature = signature_lines.join("\n");

        let assertion = Assertion {
            type_name,
            headers,
            body,
            revision,
            signature,
        };

        // Known types additionally get their mandatory headers checked.
        if let Some(typ) = self.registry.find(assertion.type_name()) {
            if let Some(header) = typ.missing_mandatory(&assertion) {
                return Err(WireError::MandatoryHeader {
                    type_name: assertion.type_name().to_string(),
                    header: header.to_string(),
                });
            }
        }
        Ok(Some(assertion))
    }

    /// Read one line, stripping the trailing newline. `None` at EOF.
    fn read_line(&mut self) -> Result<Option<String>, WireError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(Some(line))
    }
}

fn parse_header_line(line: &str, headers: &mut Headers) -> Result<(), WireError> {
    let (name, value) = line
        .split_once(": ")
        .ok_or_else(|| WireError::HeaderLine(line.to_string()))?;
    if !valid_header_name(name) {
        return Err(WireError::HeaderName(name.to_string()));
    }
    if headers.contains(name) {
        return Err(WireError::DuplicateHeader(name.to_string()));
    }
    headers.set(name, value);
    Ok(())
}

/// Decode a single assertion from a byte slice.
///
/// Fails on empty input; trailing data after the first assertion is
/// ignored.
pub fn decode_assertion(bytes: &[u8], registry: &TypeRegistry) -> Result<Assertion, WireError> {
    let mut decoder = Decoder::new(bytes, registry);
    decoder.decode()?.ok_or(WireError::Empty)
}

/// Bundle encoder writing assertions separated by blank lines.
pub struct Encoder<W: Write> {
    writer: W,
    count: usize,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }

    /// Append one assertion to the bundle.
    pub fn append(&mut self, assertion: &Assertion) -> Result<(), WireError> {
        if self.count > 0 {
            self.writer.write_all(b"\n")?;
        }
        self.writer.write_all(&assertion.encode())?;
        self.count += 1;
        Ok(())
    }

    /// Number of assertions appended so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Encode a slice of assertions into a bundle.
pub fn encode_bundle(assertions: &[Assertion]) -> Vec<u8> {
    let mut encoder = Encoder::new(Vec::new());
    for assertion in assertions {
        // Writing to a Vec cannot fail.
        let _ = encoder.append(assertion);
    }
    encoder.into_inner()
}

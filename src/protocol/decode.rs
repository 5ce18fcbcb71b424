//! Protocol message decoding

use super::constants::{auth, tags};
use super::message::{AuthenticationMessage, BackendMessage, ErrorFields};
use bytes::BytesMut;
use std::io;

/// Maximum message length (1 GB), matching PostgreSQL's own `PQ_LARGE_MESSAGE_LIMIT`.
///
/// Lengths above this are rejected before the body is buffered.
const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

/// Decode one backend message from the front of `data`
///
/// Returns the message and the number of bytes it occupied; the caller
/// advances the buffer. An `UnexpectedEof` error means more bytes are needed.
pub fn decode_message(data: &BytesMut) -> io::Result<(BackendMessage, usize)> {
    if data.len() < 5 {
        return Err(eof("incomplete message header"));
    }

    let tag = data[0];
    let len = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    if len < 4 {
        return Err(invalid(format!("message length {} is too small", len)));
    }
    let len = len as usize;

    if len > MAX_MESSAGE_LENGTH {
        return Err(invalid(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_LENGTH
        )));
    }

    if data.len() < len + 1 {
        return Err(eof("incomplete message body"));
    }

    let body = &data[5..len + 1];

    let msg = match tag {
        tags::AUTHENTICATION => decode_authentication(body)?,
        tags::BACKEND_KEY_DATA => {
            let mut reader = Reader(body);
            BackendMessage::BackendKeyData {
                process_id: reader.i32()?,
                secret_key: reader.i32()?,
            }
        }
        tags::BIND_COMPLETE => BackendMessage::BindComplete,
        tags::COMMAND_COMPLETE => BackendMessage::CommandComplete(Reader(body).cstr()?),
        tags::DATA_ROW => BackendMessage::DataRow {
            columns: Reader(body).i16()? as usize,
        },
        tags::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(body)?),
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(body)?),
        tags::PARAMETER_STATUS => {
            let mut reader = Reader(body);
            BackendMessage::ParameterStatus {
                name: reader.cstr()?,
                value: reader.cstr()?,
            }
        }
        tags::PARSE_COMPLETE => BackendMessage::ParseComplete,
        tags::READY_FOR_QUERY => BackendMessage::ReadyForQuery {
            status: Reader(body).u8()?,
        },
        tags::ROW_DESCRIPTION => BackendMessage::RowDescription {
            fields: Reader(body).i16()? as usize,
        },
        _ => return Err(invalid(format!("unknown message tag: {}", tag))),
    };

    Ok((msg, len + 1))
}

fn eof(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, what.to_string())
}

fn invalid(what: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what)
}

/// Cursor over a message body
struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.0.len() < n {
            return Err(invalid("truncated message body".into()));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn i16(&mut self) -> io::Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> io::Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn cstr(&mut self) -> io::Result<String> {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid("missing null terminator in string".into()))?;
        let s = String::from_utf8_lossy(&self.0[..end]).to_string();
        self.0 = &self.0[end + 1..];
        Ok(s)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.0)
    }
}

fn decode_authentication(body: &[u8]) -> io::Result<BackendMessage> {
    let mut reader = Reader(body);
    let auth_type = reader.i32()?;

    let auth_msg = match auth_type {
        auth::OK => AuthenticationMessage::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
        auth::MD5_PASSWORD => {
            let mut salt = [0u8; 4];
            salt.copy_from_slice(reader.take(4)?);
            AuthenticationMessage::Md5Password { salt }
        }
        auth::SASL => {
            // Null-terminated mechanism names, ended by an empty name
            let mut mechanisms = Vec::new();
            while !reader.0.is_empty() {
                let mechanism = reader.cstr()?;
                if mechanism.is_empty() {
                    break;
                }
                mechanisms.push(mechanism);
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthenticationMessage::SaslContinue {
            data: reader.rest().to_vec(),
        },
        auth::SASL_FINAL => AuthenticationMessage::SaslFinal {
            data: reader.rest().to_vec(),
        },
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported auth type: {}", auth_type),
            ))
        }
    };

    Ok(BackendMessage::Authentication(auth_msg))
}

fn decode_error_fields(body: &[u8]) -> io::Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    let mut reader = Reader(body);

    while !reader.0.is_empty() {
        let field_type = reader.u8()?;
        if field_type == 0 {
            break;
        }
        let value = reader.cstr()?;

        match field_type {
            b'S' => fields.severity = Some(value),
            b'C' => fields.code = Some(value),
            b'M' => fields.message = Some(value),
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            _ => {} // Ignore unknown fields
        }
    }

    Ok(fields)
}

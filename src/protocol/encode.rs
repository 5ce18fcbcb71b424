//! Protocol message encoding

use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};

/// Encode a frontend message into bytes
pub fn encode_message(msg: &FrontendMessage) -> BytesMut {
    let mut buf = BytesMut::new();

    match msg {
        FrontendMessage::Startup { version, params } => {
            // Startup messages don't have a type byte
            framed(&mut buf, None, |buf| {
                buf.put_i32(*version);
                for (key, value) in params {
                    put_cstr(buf, key);
                    put_cstr(buf, value);
                }
                buf.put_u8(0);
            });
        }
        FrontendMessage::Password(password) => {
            framed(&mut buf, Some(b'p'), |buf| put_cstr(buf, password));
        }
        FrontendMessage::Query(query) => {
            framed(&mut buf, Some(b'Q'), |buf| put_cstr(buf, query));
        }
        FrontendMessage::Parse { name, query } => {
            framed(&mut buf, Some(b'P'), |buf| {
                put_cstr(buf, name);
                put_cstr(buf, query);
                buf.put_i16(0); // let the server infer parameter types
            });
        }
        FrontendMessage::Bind { statement, params } => {
            framed(&mut buf, Some(b'B'), |buf| {
                put_cstr(buf, ""); // unnamed portal
                put_cstr(buf, statement);
                buf.put_i16(0); // all parameters in text format
                buf.put_i16(params.len() as i16);
                for param in params {
                    match param {
                        Some(value) => {
                            buf.put_i32(value.len() as i32);
                            buf.put_slice(value.as_bytes());
                        }
                        None => buf.put_i32(-1),
                    }
                }
                buf.put_i16(0); // all results in text format
            });
        }
        FrontendMessage::Execute => {
            framed(&mut buf, Some(b'E'), |buf| {
                put_cstr(buf, "");
                buf.put_i32(0); // no row limit
            });
        }
        FrontendMessage::Sync => framed(&mut buf, Some(b'S'), |_| {}),
        FrontendMessage::Terminate => framed(&mut buf, Some(b'X'), |_| {}),
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            framed(&mut buf, Some(b'p'), |buf| {
                put_cstr(buf, mechanism);
                buf.put_i32(data.len() as i32);
                buf.put_slice(data);
            });
        }
        FrontendMessage::SaslResponse { data } => {
            framed(&mut buf, Some(b'p'), |buf| buf.put_slice(data));
        }
    }

    buf
}

/// Write an optional tag, then a length-prefixed body
fn framed(buf: &mut BytesMut, tag: Option<u8>, body: impl FnOnce(&mut BytesMut)) {
    if let Some(tag) = tag {
        buf.put_u8(tag);
    }
    let len_pos = buf.len();
    buf.put_i32(0);

    body(buf);

    // Length includes itself but not the tag
    let len = buf.len() - len_pos;
    buf[len_pos..len_pos + 4].copy_from_slice(&(len as i32).to_be_bytes());
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_of(buf: &[u8]) -> i32 {
        i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]])
    }

    #[test]
    fn test_encode_query() {
        let buf = encode_message(&FrontendMessage::Query("SELECT 1".to_string()));

        assert_eq!(buf[0], b'Q');
        assert_eq!(length_of(&buf), (buf.len() - 1) as i32);
        assert_eq!(&buf[5..], b"SELECT 1\0");
    }

    #[test]
    fn test_encode_terminate_and_sync() {
        assert_eq!(&encode_message(&FrontendMessage::Terminate)[..], &[b'X', 0, 0, 0, 4]);
        assert_eq!(&encode_message(&FrontendMessage::Sync)[..], &[b'S', 0, 0, 0, 4]);
    }

    #[test]
    fn test_encode_startup_has_no_tag() {
        let buf = encode_message(&FrontendMessage::Startup {
            version: crate::protocol::constants::PROTOCOL_VERSION,
            params: vec![("user".into(), "app".into())],
        });

        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, buf.len());
        assert_eq!(&buf[4..8], &[0, 3, 0, 0]);
        assert_eq!(&buf[8..], b"user\0app\0\0");
    }

    #[test]
    fn test_encode_bind_with_null() {
        let buf = encode_message(&FrontendMessage::Bind {
            statement: "s1".into(),
            params: vec![Some("42".into()), None],
        });

        assert_eq!(buf[0], b'B');
        assert_eq!(length_of(&buf), (buf.len() - 1) as i32);
        let body = &buf[5..];
        // portal "", statement "s1", 0 format codes, 2 params
        assert_eq!(&body[..8], b"\0s1\0\0\0\0\x02");
        // "42" then NULL, then 0 result format codes
        assert_eq!(&body[8..], &[0, 0, 0, 2, b'4', b'2', 0xFF, 0xFF, 0xFF, 0xFF, 0, 0]);
    }

    #[test]
    fn test_encode_sasl_initial_response() {
        let buf = encode_message(&FrontendMessage::SaslInitialResponse {
            mechanism: "SCRAM-SHA-256".into(),
            data: b"n,,n=,r=abc".to_vec(),
        });

        assert_eq!(buf[0], b'p');
        assert_eq!(length_of(&buf), (buf.len() - 1) as i32);
        let body = &buf[5..];
        assert!(body.starts_with(b"SCRAM-SHA-256\0"));
        assert_eq!(&body[14..18], &11i32.to_be_bytes());
    }
}

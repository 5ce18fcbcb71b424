//! Async protocol session over one socket

use super::{PgConfig, PgError, SessionState};
use crate::auth::{ScramClient, SCRAM_SHA_256};
use crate::config::Credentials;
use crate::metrics::{counters, labels};
use crate::protocol::constants::PROTOCOL_VERSION;
use crate::protocol::{
    decode_message, encode_message, AuthenticationMessage, BackendMessage, FrontendMessage,
};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;

type Result<T> = std::result::Result<T, PgError>;

/// Protocol session
///
/// Generic over the stream so tests can drive it with a scripted mock.
#[derive(Debug)]
pub struct Session<S> {
    stream: S,
    state: SessionState,
    read_buf: BytesMut,
    process_id: Option<i32>,
    secret_key: Option<i32>,
    parameters: HashMap<String, String>,
    next_statement: u32,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an open socket
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            state: SessionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            process_id: None,
            secret_key: None,
            parameters: HashMap::new(),
            next_statement: 0,
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Backend process id, once startup completed
    pub fn process_id(&self) -> Option<i32> {
        self.process_id
    }

    /// Process id and secret key for cancel requests
    pub fn backend_key(&self) -> Option<(i32, i32)> {
        self.process_id.zip(self.secret_key)
    }

    /// Server parameter reported through ParameterStatus
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Perform startup and authentication
    pub async fn startup(
        &mut self,
        config: &PgConfig,
        database: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        async {
            self.state.transition(SessionState::AwaitingAuth)?;

            let startup = FrontendMessage::Startup {
                version: PROTOCOL_VERSION,
                params: config.startup_params(credentials.username(), database),
            };
            self.send_messages(&[startup]).await?;

            self.state.transition(SessionState::Authenticating)?;
            self.authenticate(credentials).await?;

            self.state.transition(SessionState::Idle)?;
            tracing::info!("startup complete");
            Ok(())
        }
        .instrument(tracing::info_span!(
            "startup",
            user = %credentials.username(),
            database = %database
        ))
        .await
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let mut mechanism = labels::MECHANISM_TRUST;

        loop {
            match self.receive_message().await? {
                BackendMessage::Authentication(auth) => match auth {
                    AuthenticationMessage::Ok => {
                        tracing::debug!(mechanism, "authentication successful");
                        counters::auth_successful(mechanism);
                        // Keep reading until ReadyForQuery
                    }
                    AuthenticationMessage::CleartextPassword => {
                        mechanism = labels::MECHANISM_CLEARTEXT;
                        counters::auth_attempted(mechanism);

                        let password = credentials
                            .password()
                            .ok_or_else(|| PgError::Authentication("password required".into()))?;
                        self.send_messages(&[FrontendMessage::Password(password.to_string())])
                            .await?;
                    }
                    AuthenticationMessage::Md5Password { .. } => {
                        return Err(PgError::Authentication(
                            "MD5 authentication not supported. Use SCRAM-SHA-256 or cleartext password".into(),
                        ));
                    }
                    AuthenticationMessage::Sasl { mechanisms } => {
                        mechanism = labels::MECHANISM_SCRAM;
                        counters::auth_attempted(mechanism);
                        if let Err(e) = self.handle_sasl(&mechanisms, credentials).await {
                            counters::auth_failed(mechanism, "scram");
                            return Err(e);
                        }
                    }
                    AuthenticationMessage::SaslContinue { .. }
                    | AuthenticationMessage::SaslFinal { .. } => {
                        return Err(PgError::Protocol(
                            "unexpected SASL message outside of SASL flow".into(),
                        ));
                    }
                },
                BackendMessage::BackendKeyData {
                    process_id,
                    secret_key,
                } => {
                    self.process_id = Some(process_id);
                    self.secret_key = Some(secret_key);
                }
                BackendMessage::ParameterStatus { name, value } => {
                    tracing::debug!("parameter status: {} = {}", name, value);
                    self.parameters.insert(name, value);
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::debug!("notice during startup: {}", notice);
                }
                BackendMessage::ReadyForQuery { .. } => return Ok(()),
                BackendMessage::ErrorResponse(err) => {
                    counters::auth_failed(mechanism, "server_error");
                    return Err(PgError::Authentication(err.to_string()));
                }
                other => {
                    return Err(PgError::Protocol(format!(
                        "unexpected message during auth: {:?}",
                        other
                    )));
                }
            }
        }
    }

    async fn handle_sasl(&mut self, mechanisms: &[String], credentials: &Credentials) -> Result<()> {
        if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
            return Err(PgError::Authentication(format!(
                "server does not support SCRAM-SHA-256. Available: {}",
                mechanisms.join(", ")
            )));
        }

        let password = credentials.password().ok_or_else(|| {
            PgError::Authentication("password required for SCRAM authentication".into())
        })?;

        let scram = ScramClient::new(password);
        tracing::debug!("initiating SCRAM-SHA-256 authentication");

        self.send_messages(&[FrontendMessage::SaslInitialResponse {
            mechanism: SCRAM_SHA_256.to_string(),
            data: scram.client_first().into_bytes(),
        }])
        .await?;

        let server_first = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => {
                sasl_text(data)?
            }
            BackendMessage::ErrorResponse(err) => {
                return Err(PgError::Authentication(format!("SASL server error: {}", err)));
            }
            _ => {
                return Err(PgError::Protocol(
                    "expected SaslContinue message during SASL authentication".into(),
                ));
            }
        };

        let (client_final, scram_state) = scram
            .client_final(&server_first)
            .map_err(|e| PgError::Authentication(format!("SCRAM error: {}", e)))?;

        self.send_messages(&[FrontendMessage::SaslResponse {
            data: client_final.into_bytes(),
        }])
        .await?;

        let server_final = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => {
                sasl_text(data)?
            }
            BackendMessage::ErrorResponse(err) => {
                return Err(PgError::Authentication(format!("SASL server error: {}", err)));
            }
            _ => {
                return Err(PgError::Protocol(
                    "expected SaslFinal message during SASL authentication".into(),
                ));
            }
        };

        scram
            .verify_server_final(&server_final, &scram_state)
            .map_err(|e| PgError::Authentication(format!("SCRAM verification failed: {}", e)))?;

        tracing::debug!("SCRAM-SHA-256 authentication successful");
        Ok(())
    }

    /// Run `sql` through the simple query protocol
    ///
    /// Returns the rows affected by the last command in the string.
    pub async fn simple_query(&mut self, sql: &str) -> Result<u64> {
        self.begin_command()?;
        self.send_messages(&[FrontendMessage::Query(sql.to_string())])
            .await?;
        self.finish_command().await
    }

    /// Parse `sql` into a named server-side statement
    pub async fn prepare(&mut self, sql: &str) -> Result<String> {
        self.begin_command()?;

        let name = format!("wl_s{}", self.next_statement);
        self.next_statement = self.next_statement.wrapping_add(1);

        self.send_messages(&[
            FrontendMessage::Parse {
                name: name.clone(),
                query: sql.to_string(),
            },
            FrontendMessage::Sync,
        ])
        .await?;
        self.finish_command().await?;

        tracing::debug!(statement = %name, "statement prepared");
        Ok(name)
    }

    /// Bind text parameters to a prepared statement and run it
    pub async fn execute_prepared(&mut self, name: &str, params: &[Option<&str>]) -> Result<u64> {
        self.begin_command()?;
        self.send_messages(&[
            FrontendMessage::Bind {
                statement: name.to_string(),
                params: params.iter().map(|p| p.map(str::to_string)).collect(),
            },
            FrontendMessage::Execute,
            FrontendMessage::Sync,
        ])
        .await?;
        self.finish_command().await
    }

    fn begin_command(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(PgError::InvalidState {
                expected: SessionState::Idle.to_string(),
                actual: self.state.to_string(),
            });
        }
        self.state.transition(SessionState::QueryInProgress)
    }

    /// Drain results up to ReadyForQuery
    ///
    /// The first ErrorResponse is reported once the session is idle again.
    async fn finish_command(&mut self) -> Result<u64> {
        self.state.transition(SessionState::ReadingResults)?;

        let mut rows = 0;
        let mut error = None;

        loop {
            match self.receive_message().await? {
                BackendMessage::CommandComplete(tag) => {
                    rows = BackendMessage::rows_affected(&tag);
                }
                BackendMessage::ErrorResponse(fields) => {
                    tracing::debug!("PostgreSQL error response: {}", fields);
                    error.get_or_insert(fields);
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::debug!("PostgreSQL notice: {}", notice);
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::ReadyForQuery { .. } => break,
                _ => {}
            }
        }

        self.state.transition(SessionState::Idle)?;
        match error {
            Some(fields) => Err(PgError::Server(fields)),
            None => Ok(rows),
        }
    }

    async fn send_messages(&mut self, msgs: &[FrontendMessage]) -> Result<()> {
        let mut buf = BytesMut::new();
        for msg in msgs {
            buf.extend_from_slice(&encode_message(msg));
        }
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<BackendMessage> {
        loop {
            match decode_message(&self.read_buf) {
                Ok((msg, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(msg);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(PgError::Protocol(e.to_string())),
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(PgError::ConnectionClosed);
            }
        }
    }

    /// Send Terminate and shut the socket down
    pub async fn close(mut self) -> Result<()> {
        self.state.transition(SessionState::Closed)?;
        let _ = self.send_messages(&[FrontendMessage::Terminate]).await;
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn sasl_text(data: Vec<u8>) -> Result<String> {
    String::from_utf8(data)
        .map_err(|e| PgError::Authentication(format!("invalid UTF-8 in SASL message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use tokio_test::io::Builder;

    fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(tag);
        buf.put_i32(body.len() as i32 + 4);
        buf.put_slice(body);
        buf.to_vec()
    }

    fn auth(code: i32) -> Vec<u8> {
        frame(b'R', &code.to_be_bytes())
    }

    fn ready() -> Vec<u8> {
        frame(b'Z', b"I")
    }

    fn startup_bytes(user: &str, database: &str) -> Vec<u8> {
        encode_message(&FrontendMessage::Startup {
            version: PROTOCOL_VERSION,
            params: PgConfig::new().startup_params(user, database),
        })
        .to_vec()
    }

    fn server_greeting() -> Vec<u8> {
        let mut bytes = auth(0);
        bytes.extend(frame(b'S', b"server_version\x0016.2\0"));
        bytes.extend(frame(b'K', &[0, 0, 0, 42, 0, 0, 0, 7]));
        bytes.extend(ready());
        bytes
    }

    #[tokio::test]
    async fn test_trust_startup_query_and_close() {
        let mut reply = frame(b'C', b"UPDATE 3\0");
        reply.extend(ready());

        let mock = Builder::new()
            .write(&startup_bytes("app", "appdb"))
            .read(&server_greeting())
            .write(&encode_message(&FrontendMessage::Query("UPDATE t SET x = 1".into())))
            .read(&reply)
            .write(&encode_message(&FrontendMessage::Terminate))
            .build();

        let mut session = Session::new(mock);
        session
            .startup(&PgConfig::new(), "appdb", &Credentials::without_password("app"))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.process_id(), Some(42));
        assert_eq!(session.backend_key(), Some((42, 7)));
        assert_eq!(session.parameter("server_version"), Some("16.2"));

        assert_eq!(session.simple_query("UPDATE t SET x = 1").await.unwrap(), 3);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_cleartext_password() {
        let mock = Builder::new()
            .write(&startup_bytes("app", "appdb"))
            .read(&auth(3))
            .write(&encode_message(&FrontendMessage::Password("hunter2".into())))
            .read(&server_greeting())
            .build();

        let mut session = Session::new(mock);
        session
            .startup(&PgConfig::new(), "appdb", &Credentials::new("app", "hunter2"))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_cleartext_without_password_fails() {
        let mock = Builder::new()
            .write(&startup_bytes("app", "appdb"))
            .read(&auth(3))
            .build();

        let mut session = Session::new(mock);
        let err = session
            .startup(&PgConfig::new(), "appdb", &Credentials::without_password("app"))
            .await
            .unwrap_err();
        assert!(matches!(err, PgError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_error_during_auth() {
        let mock = Builder::new()
            .write(&startup_bytes("app", "appdb"))
            .read(&frame(
                b'E',
                b"SFATAL\0C28P01\0Mpassword authentication failed for user \"app\"\0\0",
            ))
            .build();

        let mut session = Session::new(mock);
        let err = session
            .startup(&PgConfig::new(), "appdb", &Credentials::new("app", "wrong"))
            .await
            .unwrap_err();
        match err {
            PgError::Authentication(msg) => assert!(msg.contains("28P01")),
            other => panic!("expected authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_md5_rejected() {
        let mut body = 5i32.to_be_bytes().to_vec();
        body.extend_from_slice(&[1, 2, 3, 4]);
        let mock = Builder::new()
            .write(&startup_bytes("app", "appdb"))
            .read(&frame(b'R', &body))
            .build();

        let mut session = Session::new(mock);
        let err = session
            .startup(&PgConfig::new(), "appdb", &Credentials::new("app", "pw"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("MD5"));
    }

    #[tokio::test]
    async fn test_server_error_leaves_session_idle() {
        let mut reply = frame(b'E', b"SERROR\0C42P01\0Mrelation \"nope\" does not exist\0\0");
        reply.extend(ready());

        let mock = Builder::new()
            .write(&startup_bytes("app", "appdb"))
            .read(&server_greeting())
            .write(&encode_message(&FrontendMessage::Query("SELECT * FROM nope".into())))
            .read(&reply)
            .build();

        let mut session = Session::new(mock);
        session
            .startup(&PgConfig::new(), "appdb", &Credentials::without_password("app"))
            .await
            .unwrap();

        let err = session.simple_query("SELECT * FROM nope").await.unwrap_err();
        assert_eq!(err.sqlstate(), Some("42P01"));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_prepare_and_execute() {
        let mut expected = encode_message(&FrontendMessage::Parse {
            name: "wl_s0".into(),
            query: "DELETE FROM jobs WHERE id = $1".into(),
        });
        expected.extend_from_slice(&encode_message(&FrontendMessage::Sync));

        let mut parsed = frame(b'1', b"");
        parsed.extend(ready());

        let mut bind = encode_message(&FrontendMessage::Bind {
            statement: "wl_s0".into(),
            params: vec![Some("17".into())],
        });
        bind.extend_from_slice(&encode_message(&FrontendMessage::Execute));
        bind.extend_from_slice(&encode_message(&FrontendMessage::Sync));

        let mut executed = frame(b'2', b"");
        executed.extend(frame(b'C', b"DELETE 1\0"));
        executed.extend(ready());

        let mock = Builder::new()
            .write(&startup_bytes("app", "appdb"))
            .read(&server_greeting())
            .write(&expected)
            .read(&parsed)
            .write(&bind)
            .read(&executed)
            .build();

        let mut session = Session::new(mock);
        session
            .startup(&PgConfig::new(), "appdb", &Credentials::without_password("app"))
            .await
            .unwrap();

        let name = session.prepare("DELETE FROM jobs WHERE id = $1").await.unwrap();
        assert_eq!(name, "wl_s0");
        assert_eq!(session.execute_prepared(&name, &[Some("17")]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_before_startup_rejected() {
        let mut session = Session::new(Builder::new().build());
        let err = session.simple_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, PgError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_server_hangup() {
        let mock = Builder::new()
            .write(&startup_bytes("app", "appdb"))
            .build();

        let mut session = Session::new(mock);
        let err = session
            .startup(&PgConfig::new(), "appdb", &Credentials::without_password("app"))
            .await
            .unwrap_err();
        assert!(matches!(err, PgError::ConnectionClosed));
    }
}

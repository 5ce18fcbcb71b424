//! Protocol message types

/// Frontend message (client → server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// Startup message
    Startup {
        /// Protocol version
        version: i32,
        /// Connection parameters
        params: Vec<(String, String)>,
    },

    /// Cleartext password
    Password(String),

    /// Simple query
    Query(String),

    /// Parse a named statement
    Parse {
        /// Statement name ("" for unnamed)
        name: String,
        /// SQL text
        query: String,
    },

    /// Bind parameters to a statement into the unnamed portal
    Bind {
        /// Statement name
        statement: String,
        /// Text-format parameters (`None` is SQL NULL)
        params: Vec<Option<String>>,
    },

    /// Execute the unnamed portal
    Execute,

    /// Sync
    Sync,

    /// Terminate
    Terminate,

    /// SASL initial response
    SaslInitialResponse {
        /// SASL mechanism name (e.g., "SCRAM-SHA-256")
        mechanism: String,
        /// Client first message
        data: Vec<u8>,
    },

    /// SASL response
    SaslResponse {
        /// Client final message
        data: Vec<u8>,
    },
}

/// Backend message (server → client)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// Authentication request
    Authentication(AuthenticationMessage),

    /// Backend key data (for cancellation)
    BackendKeyData {
        /// Process ID
        process_id: i32,
        /// Secret key
        secret_key: i32,
    },

    /// Bind complete
    BindComplete,

    /// Command complete with its tag (e.g. "UPDATE 3")
    CommandComplete(String),

    /// Data row; only the column count is kept
    DataRow {
        /// Number of columns
        columns: usize,
    },

    /// Empty query string was executed
    EmptyQueryResponse,

    /// Error response
    ErrorResponse(ErrorFields),

    /// Notice response
    NoticeResponse(ErrorFields),

    /// Parameter status
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },

    /// Parse complete
    ParseComplete,

    /// Ready for query
    ReadyForQuery {
        /// Transaction status
        status: u8,
    },

    /// Row description; only the field count is kept
    RowDescription {
        /// Number of fields
        fields: usize,
    },
}

/// Authentication message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationMessage {
    /// Authentication OK
    Ok,

    /// Cleartext password required
    CleartextPassword,

    /// MD5 password required
    Md5Password {
        /// Salt for MD5 hash
        salt: [u8; 4],
    },

    /// SASL authentication mechanisms available
    Sasl {
        /// Mechanism names (e.g., ["SCRAM-SHA-256"])
        mechanisms: Vec<String>,
    },

    /// SASL server challenge
    SaslContinue {
        /// Server first message
        data: Vec<u8>,
    },

    /// SASL server verification
    SaslFinal {
        /// Server final message
        data: Vec<u8>,
    },
}

/// Error/notice fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity (ERROR, FATAL, ...)
    pub severity: Option<String>,
    /// SQLSTATE code
    pub code: Option<String>,
    /// Human-readable message
    pub message: Option<String>,
    /// Additional detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref severity) = self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(ref msg) = self.message {
            write!(f, "{}", msg)?;
        }
        if let Some(ref code) = self.code {
            write!(f, " ({})", code)?;
        }
        Ok(())
    }
}

impl BackendMessage {
    /// Rows affected according to a CommandComplete tag
    ///
    /// `INSERT 0 5` → 5, `UPDATE 3` → 3, `CREATE TABLE` → 0.
    pub fn rows_affected(tag: &str) -> u64 {
        tag.rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

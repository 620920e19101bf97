//! Statements and their per-statement execution options.

pub mod builder;

pub use builder::{CqlBuildError, CqlBuilder};

/// Consistency level of a query.
///
/// The pool passes this value through to the connection untouched; it has no
/// influence on routing or retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Consistency {
    /// Closest replica, no acknowledgment required.
    Any = 0x0000,
    /// One replica must respond.
    One = 0x0001,
    /// Two replicas must respond.
    Two = 0x0002,
    /// Three replicas must respond.
    Three = 0x0003,
    /// A majority of replicas must respond.
    #[default]
    Quorum = 0x0004,
    /// All replicas must respond.
    All = 0x0005,
    /// A majority of replicas in the local datacenter must respond.
    LocalQuorum = 0x0006,
    /// A majority of replicas in each datacenter must respond.
    EachQuorum = 0x0007,
    /// Serial reads for lightweight transactions.
    Serial = 0x0008,
    /// Serial reads within the local datacenter.
    LocalSerial = 0x0009,
    /// One replica in the local datacenter must respond.
    LocalOne = 0x000A,
}

/// A CQL statement to be executed through a [`Session`](crate::Session).
///
/// Wraps the statement text together with per-statement options. All
/// execution entry points accept anything `Into<Statement>`, so a plain
/// `&str` works wherever no options need overriding.
#[derive(Debug, Clone)]
pub struct Statement {
    /// The CQL statement text.
    pub contents: String,
    pub(crate) config: StatementConfig,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StatementConfig {
    pub(crate) consistency: Option<Consistency>,
}

impl Statement {
    /// Creates a new [`Statement`] from a CQL statement string.
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            contents: query_text.into(),
            config: Default::default(),
        }
    }

    /// Returns self with the consistency set to the given level.
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.set_consistency(consistency);
        self
    }

    /// Sets the consistency to be used when executing this statement.
    pub fn set_consistency(&mut self, consistency: Consistency) {
        self.config.consistency = Some(consistency);
    }

    /// Unsets the consistency overridden on this statement.
    /// This means that the session's default consistency will be used.
    pub fn unset_consistency(&mut self) {
        self.config.consistency = None;
    }

    /// Gets the consistency to be used when executing this statement if it
    /// is filled. If this is empty, the session default will be used.
    pub fn get_consistency(&self) -> Option<Consistency> {
        self.config.consistency
    }
}

impl From<String> for Statement {
    fn from(s: String) -> Statement {
        Statement::new(s)
    }
}

impl<'a> From<&'a str> for Statement {
    fn from(s: &'a str) -> Statement {
        Statement::new(s.to_owned())
    }
}

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Both an explicit flavor and an `@flavor` suffix were given.
    ConflictingFlavor,
    InvalidPort,
    /// `make` could not be run against the port, or it exited non-zero.
    RecipeQuery,
    MissingOptionsFile,
    InvalidOptionsFile,
    ReconfigurationFailed,
    MissingTool,
    Config,
    Poudriere,
    Io,
    Other,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConflictingFlavor => "conflicting-flavor",
            ErrorKind::InvalidPort => "invalid-port",
            ErrorKind::RecipeQuery => "recipe-query",
            ErrorKind::MissingOptionsFile => "missing-options-file",
            ErrorKind::InvalidOptionsFile => "invalid-options-file",
            ErrorKind::ReconfigurationFailed => "reconfiguration-failed",
            ErrorKind::MissingTool => "missing-tool",
            ErrorKind::Config => "config",
            ErrorKind::Poudriere => "poudriere",
            ErrorKind::Io => "io",
            ErrorKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Other, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::new(ErrorKind::Config, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

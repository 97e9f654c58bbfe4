use std::fmt;

type BoxDynError = Box<dyn std::error::Error + Send + Sync>;

/// the stage of the process an error came out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Generic,
    Config,
    Io,
    Database,
    Storage,
    Sec,
    Jobs,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Generic => "Error",
            Kind::Config => "ConfigError",
            Kind::Io => "IoError",
            Kind::Database => "DatabaseError",
            Kind::Storage => "StorageError",
            Kind::Sec => "SecError",
            Kind::Jobs => "JobsError",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// startup and process level error. component errors are their own
/// `thiserror` enums and get wrapped into this when they escape to `main`
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    msg: Option<String>,
    src: Option<BoxDynError>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new() -> Error {
        Error {
            kind: Kind::Generic,
            msg: None,
            src: None,
        }
    }

    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    pub fn message<M>(mut self, msg: M) -> Error
    where
        M: Into<String>
    {
        self.msg = Some(msg.into());
        self
    }

    pub fn source<S>(mut self, src: S) -> Error
    where
        S: Into<BoxDynError>
    {
        self.src = Some(src.into());
        self
    }

    pub fn get_kind(&self) -> Kind {
        self.kind
    }
}

impl Default for Error {
    fn default() -> Self {
        Error::new()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(msg) = &self.msg {
            write!(f, ": {msg}")?;
        }

        if let Some(err) = &self.src {
            if self.msg.is_some() {
                write!(f, "\n{err}")?;
            } else {
                write!(f, ": {err}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.src.as_ref().map(|v| & **v as _)
    }
}

impl From<deadpool_postgres::BuildError> for Error {
    fn from(err: deadpool_postgres::BuildError) -> Self {
        use deadpool_postgres::BuildError;

        match err {
            BuildError::Backend(e) => Error::new()
                .kind(Kind::Database)
                .message("failed to create database pool")
                .source(e),
            BuildError::NoRuntimeSpecified(string) => Error::new()
                .kind(Kind::Database)
                .message("database pool has no async runtime")
                .source(string)
        }
    }
}

impl From<hkdf::InvalidLength> for Error {
    fn from(_err: hkdf::InvalidLength) -> Self {
        Error::new()
            .kind(Kind::Sec)
            .message("invalid output length when deriving key")
    }
}

macro_rules! generic_catch {
    ($k:expr, $e:path) => {
        impl From<$e> for Error {
            fn from(err: $e) -> Self {
                Error::new()
                    .kind($k)
                    .source(err)
            }
        }
    };
    ($k:expr, $e:path, $m:expr) => {
        impl From<$e> for Error {
            fn from(err: $e) -> Self {
                Error::new()
                    .kind($k)
                    .message($m)
                    .source(err)
            }
        }
    }
}

generic_catch!(Kind::Io, std::io::Error);
generic_catch!(Kind::Config, serde_json::Error, "invalid json");
generic_catch!(Kind::Config, serde_yaml::Error, "invalid yaml");
generic_catch!(Kind::Jobs, cron::error::Error, "invalid job schedule");
generic_catch!(Kind::Storage, crate::storage::StoreError);

vibe_lib::context_trait!(Error);

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<BoxDynError>
{
    fn context<C>(self, cxt: C) -> std::result::Result<T, Error>
    where
        C: Into<String>
    {
        self.map_err(|err| Error::new()
            .message(cxt)
            .source(err))
    }
}

impl<T> Context<T, ()> for std::option::Option<T> {
    fn context<C>(self, cxt: C) -> std::result::Result<T, Error>
    where
        C: Into<String>
    {
        self.ok_or_else(|| Error::new()
            .message(cxt))
    }
}

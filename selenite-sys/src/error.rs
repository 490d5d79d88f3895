#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Error {
    LibError(libsqlite3_sys::Error),
    Bug(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::LibError(e) => write!(f, "LibError({})", e),
            Self::Bug(e) => write!(f, "Bug({})", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<i32> for Error {
    fn from(e: i32) -> Self {
        Self::LibError(libsqlite3_sys::Error::new(e))
    }
}

impl From<libsqlite3_sys::Error> for Error {
    fn from(value: libsqlite3_sys::Error) -> Self {
        Self::LibError(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

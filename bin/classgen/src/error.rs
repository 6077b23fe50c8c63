use std::fmt;

/// Ways the driver can fail
#[derive(Debug)]
pub enum DriverError {
    /// The program uses a variable it never declared
    UndeclaredVariable(String),

    /// The rayon pool could not be configured
    ThreadPool(rayon::ThreadPoolBuildError),

    /// Class file versions before 51 do not use `StackMapTable` frames
    UnsupportedTarget(u16),

    IoError(std::io::Error),
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> DriverError {
        DriverError::IoError(err)
    }
}

impl From<rayon::ThreadPoolBuildError> for DriverError {
    fn from(err: rayon::ThreadPoolBuildError) -> DriverError {
        DriverError::ThreadPool(err)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::UndeclaredVariable(name) => write!(f, "Variable {} not declared", name),
            DriverError::ThreadPool(err) => write!(f, "cannot start worker threads: {}", err),
            DriverError::UnsupportedTarget(major) => {
                write!(f, "class file version {} is not supported", major)
            }
            DriverError::IoError(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for DriverError {}

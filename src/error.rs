/// Main error type for the library.
#[derive(Debug)]
pub enum Error {
    /// Used when the user passes an out-of-range or inconsistent
    /// configuration value. Raised before any computation starts.
    InvalidConfiguration(String),
    /// A radius query returned no neighbors for the given point.
    InsufficientNeighbors { index: usize },
    /// A neighborhood was too small for a rank-3 covariance.
    DegenerateNeighborhood { index: usize, neighbors: usize },
    /// The solver ran out of usable correspondences.
    DidNotConverge(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidConfiguration(msg) => write!(f, "Configuration error: {}", msg),
            Error::InsufficientNeighbors { index } => {
                write!(f, "No neighbors within radius for point {}", index)
            }
            Error::DegenerateNeighborhood { index, neighbors } => write!(
                f,
                "Degenerate neighborhood at point {}: {} neighbors",
                index, neighbors
            ),
            Error::DidNotConverge(msg) => write!(f, "Registration did not converge: {}", msg),
        }
    }
}

impl Error {
    /// Create an error with the kind `InvalidConfiguration`.
    /// # Arguments
    /// * `msg` - The error message.
    pub fn invalid_configuration<T: ToString>(msg: T) -> Self {
        Error::InvalidConfiguration(msg.to_string())
    }
}

impl std::error::Error for Error {}

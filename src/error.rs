use thiserror::Error;

use crate::cache::ReplacementPolicy;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Only invalid input and invalid configuration are errors. Loss of precision during the
/// analysis (address expressions degrading to TOP, unknown loop bounds, enumeration caps) is
/// never reported here; it shows up in the classification of the affected accesses instead.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Inconsistent caller input
/// - [`Error::GraphError`] - Invalid control flow graph construction
///
/// ## Configuration Errors
/// - [`Error::InvalidCacheGeometry`] - Cache geometry out of range
/// - [`Error::MissingDataCache`] - No data cache configured
/// - [`Error::UnifiedCache`] - Unified instruction/data caches are not analysable
/// - [`Error::UnsupportedPolicy`] - Replacement policy other than LRU
/// - [`Error::UnmappedAddress`] - Access outside every memory bank
///
/// ## Analysis Errors
/// - [`Error::IterationLimit`] - A fixed point exceeded its visit budget
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::{cache::PidAnalysis, Error};
///
/// match PidAnalysis::new(&cfg, &caches, &memory).run() {
///     Ok(results) => println!("{}", results.statistics()),
///     Err(Error::UnsupportedPolicy(policy)) => eprintln!("cannot analyse {policy} caches"),
///     Err(Error::UnmappedAddress { address, instruction }) => {
///         eprintln!("{instruction:#x} accesses unmapped address {address:#x}");
///     }
///     Err(e) => eprintln!("analysis failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input is inconsistent.
    ///
    /// Raised for loop bounds attached to blocks that head no loop, or initial
    /// states naming temporaries. The error includes the source location where
    /// the problem was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Control flow graph error.
    ///
    /// The graph is empty, its entry is out of range, or an edge names a
    /// block that does not exist.
    #[error("{0}")]
    GraphError(String),

    /// The cache geometry cannot be analysed.
    ///
    /// Associativity must be non-zero and fit the age representation; set
    /// count and block size are powers of two whose bit widths must fit a
    /// 32-bit address.
    #[error("Invalid cache geometry - {0}")]
    InvalidCacheGeometry(String),

    /// No data cache is configured.
    #[error("No data cache is configured")]
    MissingDataCache,

    /// Instruction and data share one cache.
    #[error("Unified instruction/data caches are not supported")]
    UnifiedCache,

    /// The data cache uses a replacement policy other than LRU.
    #[error("Replacement policy {0} is not supported, only LRU caches can be analysed")]
    UnsupportedPolicy(ReplacementPolicy),

    /// A resolved access falls outside every memory bank.
    ///
    /// # Fields
    ///
    /// * `address` - Lowest address of the access
    /// * `instruction` - Address of the accessing instruction
    #[error("Access at {instruction:#010x} targets unmapped address {address:#010x}")]
    UnmappedAddress {
        /// Lowest address of the access
        address: u32,
        /// Address of the accessing instruction
        instruction: u32,
    },

    /// Fixed-point iteration limit reached.
    ///
    /// The associated value is the visit budget that was exhausted.
    #[error("Reached the maximum number of fixed-point visits allowed - {0}")]
    IterationLimit(usize),
}

//! Engine status codes.
//!
//! Replies carry POSIX-style error numbers. The table is advisory: codes it
//! does not know are shown as plain numbers.

use common::Error;

const NAMES: [&str; 35] = [
    "0", "EPERM", "ENOENT", "ESRCH", "EINTR", "EIO", "ENXIO", "E2BIG", "ENOEXEC", "EBADF",
    "ECHILD", "EAGAIN", "ENOMEM", "EACCES", "EFAULT", "ENOTBLK", "EBUSY", "EEXIST", "EXDEV",
    "ENODEV", "ENOTDIR", "EISDIR", "EINVAL", "ENFILE", "EMFILE", "ENOTTY", "ETXTBSY", "EFBIG",
    "ENOSPC", "ESPIPE", "EROFS", "EMLINK", "EPIPE", "EDOM", "ERANGE",
];

/// Symbolic name for a nonzero status code.
///
/// Negative codes are looked up by magnitude. Unknown codes come back as
/// decimal text.
pub fn describe_status(code: i32) -> String {
    let magnitude = code.unsigned_abs();
    match NAMES.get(magnitude as usize) {
        Some(name) => (*name).to_string(),
        None => magnitude.to_string(),
    }
}

/// Turn a reply's status into an error, or `Ok` when it is zero.
pub fn check_status(code: i32, message: &str) -> Result<(), Error> {
    if code == 0 {
        return Ok(());
    }
    Err(Error::engine(code, describe_status(code), message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(describe_status(1), "EPERM");
        assert_eq!(describe_status(13), "EACCES");
        assert_eq!(describe_status(17), "EEXIST");
        assert_eq!(describe_status(22), "EINVAL");
        assert_eq!(describe_status(34), "ERANGE");
    }

    #[test]
    fn test_negative_codes_use_magnitude() {
        assert_eq!(describe_status(-2), "ENOENT");
    }

    #[test]
    fn test_unknown_codes_render_as_numbers() {
        assert_eq!(describe_status(35), "35");
        assert_eq!(describe_status(9999), "9999");
        assert_eq!(describe_status(i32::MIN), "2147483648");
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(0, "").is_ok());
        let err = check_status(5, "io failure").unwrap_err();
        assert_eq!(err.status(), Some(5));
        assert_eq!(err.to_string(), "EIO:io failure");
    }
}

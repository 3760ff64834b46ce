mod encoding;
mod error;
mod rights;
mod time;

pub use self::encoding::{base64_decode, base64_encode, hex_decode, hex_encode};
pub use self::error::{DecodeError, StatusCode};
pub use self::rights::{RIGHT_COPY, RIGHT_END, RIGHT_PRINT, RIGHT_START, RIGHT_TTS, is_countable_right};
pub use self::time::{Clock, Instant, SystemClock, format_rfc3339, parse_rfc3339};

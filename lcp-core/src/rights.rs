/**
    Well-known right names (spec §3). Unknown names are still accepted
    by [`crate`] consumers — these constants only name the ones with
    special typed handling (countable, boolean, or time-bounded).
*/
pub const RIGHT_PRINT: &str = "print";
pub const RIGHT_COPY: &str = "copy";
pub const RIGHT_TTS: &str = "tts";
pub const RIGHT_START: &str = "start";
pub const RIGHT_END: &str = "end";

/**
    Countable rights support [`crate`]'s atomic `consume` operation.
*/
pub const fn is_countable_right(name: &str) -> bool {
    matches!(name.as_bytes(), b"print" | b"copy")
}

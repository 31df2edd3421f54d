/// Max bytes in a purpose or PIC label.
pub const MAX_LABEL_LEN: usize = 200;

/// Max reservations a store will hold.
pub const MAX_RESERVATIONS: usize = 50_000;

/// Max bytes in one wire line (request or response).
pub const MAX_LINE_LEN: usize = 8 * 1024 * 1024;

/// Max bytes in one journal record. Longer length prefixes are read as corruption.
pub const MAX_JOURNAL_RECORD_LEN: usize = 64 * 1024;

/// Calendar opening hours used for utilisation.
pub const OPEN_FROM_HOUR: u32 = 8;
pub const OPEN_UNTIL_HOUR: u32 = 20;

/// Latest instant a reservation may end at, unless configured otherwise.
pub const DEFAULT_NOT_AFTER: &str = "2030-12-31T23:59";

//! Well-known storage keys.
//!
//! These are the exact keys the console has always used; they double as the
//! de facto persisted-state format, so they must not be renamed.

pub const TOKEN: &str = "token";
pub const USER: &str = "user";
pub const ORDINI: &str = "ordini";
pub const CLIENTI: &str = "clienti";
pub const RICETTE: &str = "ricette";
pub const PIANI_PRODUZIONE: &str = "pianiProduzione";
pub const IMPOSTAZIONI_AZIENDA: &str = "impostazioniAzienda";
pub const FATTURE: &str = "fatture";

/// All keys included in a backup snapshot.
pub const ALL: &[&str] = &[
    TOKEN,
    USER,
    ORDINI,
    CLIENTI,
    RICETTE,
    PIANI_PRODUZIONE,
    IMPOSTAZIONI_AZIENDA,
    FATTURE,
];

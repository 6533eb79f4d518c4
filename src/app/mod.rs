/// Process-wide wiring: configuration (`config::Config` → [`config::AppConfig`]),
/// the Store's connection pool and migrations (`database`), and the
/// dependency-bag/router assembly that runs once at startup (`init`).
pub(crate) mod config;
pub(crate) mod database;
pub(crate) mod init;

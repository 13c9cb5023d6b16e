//! Terminal output helpers shared by the reader subcommands.

use std::io::{IsTerminal, Write};

/// ANSI color writer. Color is applied only when the destination is a
/// terminal (and `TERM` is not `dumb`) unless forced with `-c`.
#[derive(Clone, Copy, Debug)]
pub struct Color {
    enabled: bool,
}

impl Color {
    pub fn stdout(force: bool) -> Self {
        Color {
            enabled: force || (std::io::stdout().is_terminal() && term_supports_color()),
        }
    }

    pub fn stderr(force: bool) -> Self {
        Color {
            enabled: force || (std::io::stderr().is_terminal() && term_supports_color()),
        }
    }

    fn wrap(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn green(&self, text: &str) -> String {
        self.wrap("32", text)
    }

    pub fn yellow(&self, text: &str) -> String {
        self.wrap("33", text)
    }

    pub fn red(&self, text: &str) -> String {
        self.wrap("31", text)
    }

    pub fn cyan(&self, text: &str) -> String {
        self.wrap("36", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.wrap("2", text)
    }
}

fn term_supports_color() -> bool {
    match std::env::var("TERM") {
        Ok(term) => term != "dumb",
        Err(_) => true,
    }
}

/// Where diagnostics go: stdout by default, stderr when raw payload
/// extraction owns stdout, or nowhere.
pub enum Sink {
    Stdout(Color),
    Stderr(Color),
    Quiet,
}

impl Sink {
    /// Pick the sink per the common flag convention: `extracting` routes
    /// payload bytes to stdout, `message` keeps diagnostics on stderr.
    pub fn select(extracting: bool, message: bool, force_color: bool) -> Self {
        if message {
            Sink::Stderr(Color::stderr(force_color))
        } else if extracting {
            Sink::Quiet
        } else {
            Sink::Stdout(Color::stdout(force_color))
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Sink::Stdout(c) | Sink::Stderr(c) => *c,
            Sink::Quiet => Color { enabled: false },
        }
    }

    /// Print one diagnostic line; broken pipes end the process quietly.
    pub fn line(&self, text: &str) {
        let zult = match self {
            Sink::Stdout(_) => writeln!(std::io::stdout(), "{text}"),
            Sink::Stderr(_) => writeln!(std::io::stderr(), "{text}"),
            Sink::Quiet => return,
        };
        if zult.is_err() {
            std::process::exit(1);
        }
    }

    pub fn active(&self) -> bool {
        !matches!(self, Sink::Quiet)
    }
}

/// Write raw payload bytes to stdout, exiting on a closed pipe.
pub fn emit_raw(bytes: &[u8]) {
    let mut out = std::io::stdout().lock();
    if out.write_all(bytes).and_then(|()| out.flush()).is_err() {
        std::process::exit(1);
    }
}

/// ECEF to geodetic latitude, longitude (degrees) and ellipsoidal height
/// (meters) on WGS84.
pub fn ecef_to_llh(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    const WGS84_ER: f64 = 6_378_137.0;
    const WGS84_EF: f64 = 1.0 / 298.257_223_563;
    let e2 = WGS84_EF * (2.0 - WGS84_EF);
    let r2 = x * x + y * y;
    let mut v = WGS84_ER;
    let mut zc = z;
    let mut zk = 0.0;
    while (zc - zk).abs() > 1e-4 {
        zk = zc;
        let sinp = zc / (r2 + zc * zc).sqrt();
        v = WGS84_ER / (1.0 - e2 * sinp * sinp).sqrt();
        zc = z + v * e2 * sinp;
    }
    let (lat, lon) = if r2 > 1e-12 {
        (
            (zc / r2.sqrt()).atan().to_degrees(),
            y.atan2(x).to_degrees(),
        )
    } else {
        (if z > 0.0 { 90.0 } else { -90.0 }, 0.0)
    };
    (lat, lon, (r2 + zc * zc).sqrt() - v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecef_converts_a_known_point() {
        // Hiroshima-area reference station
        let (lat, lon, height) = ecef_to_llh(-3_551_876.8287, 3_887_786.8599, 3_586_946.3873);
        assert!((lat - 34.4401061).abs() < 1e-6, "lat {lat}");
        assert!((lon - 132.4147804).abs() < 1e-6, "lon {lon}");
        assert!((height - 233.362).abs() < 1e-3, "height {height}");
    }

    #[test]
    fn poles_do_not_divide_by_zero() {
        let (lat, lon, _) = ecef_to_llh(0.0, 0.0, 6_356_752.3);
        assert_eq!(lat, 90.0);
        assert_eq!(lon, 0.0);
    }
}

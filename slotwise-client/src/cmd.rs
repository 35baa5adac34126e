//! Command builder
//!
//! A [`Cmd`] is a command name plus binary-safe arguments. Arguments added
//! with [`Cmd::key`] are remembered as key positions, which is what the
//! cluster router uses for slot routing and multi-key splitting.

use std::fmt;

/// Conversion into a single wire argument
pub trait ToArg {
    fn to_arg(&self) -> Vec<u8>;
}

impl ToArg for str {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Vec<u8> {
        self.clone()
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Vec<u8> {
        (**self).to_arg()
    }
}

macro_rules! integer_args {
    ($($t:ty),*) => {
        $(impl ToArg for $t {
            fn to_arg(&self) -> Vec<u8> {
                self.to_string().into_bytes()
            }
        })*
    };
}

integer_args!(i32, i64, u16, u32, u64, usize);

impl ToArg for f64 {
    fn to_arg(&self) -> Vec<u8> {
        if self.is_infinite() {
            if self.is_sign_positive() { b"+inf".to_vec() } else { b"-inf".to_vec() }
        } else {
            self.to_string().into_bytes()
        }
    }
}

/// A key together with the non-key arguments that follow it
/// (`MSET k1 v1 k2 v2` has two units: `k1 [v1]` and `k2 [v2]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUnit {
    pub key: Vec<u8>,
    pub args: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Cmd {
    parts: Vec<Vec<u8>>,
    key_positions: Vec<usize>,
}

impl Cmd {
    pub fn new(name: impl ToArg) -> Self {
        Self {
            parts: vec![name.to_arg()],
            key_positions: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.push_arg(arg);
        self
    }

    pub fn key(mut self, key: impl ToArg) -> Self {
        self.push_key(key);
        self
    }

    pub fn push_arg(&mut self, arg: impl ToArg) {
        self.parts.push(arg.to_arg());
    }

    pub fn push_key(&mut self, key: impl ToArg) {
        self.key_positions.push(self.parts.len());
        self.parts.push(key.to_arg());
    }

    /// Rebuild a command of the same name from key units
    pub fn from_units<'a>(name: &[u8], units: impl IntoIterator<Item = &'a KeyUnit>) -> Self {
        let mut cmd = Cmd::new(name);
        for unit in units {
            cmd.push_key(&unit.key);
            for arg in &unit.args {
                cmd.push_arg(arg);
            }
        }
        cmd
    }

    /// Upper-cased command name
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.parts[0]).to_ascii_uppercase()
    }

    pub fn name_bytes(&self) -> &[u8] {
        &self.parts[0]
    }

    /// Upper-cased first argument, for commands like `CONFIG GET`
    pub fn subcommand(&self) -> Option<String> {
        self.parts
            .get(1)
            .map(|a| String::from_utf8_lossy(a).to_ascii_uppercase())
    }

    /// Arguments after the name
    pub fn args(&self) -> &[Vec<u8>] {
        &self.parts[1..]
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.key_positions.iter().map(|&i| self.parts[i].as_slice())
    }

    pub fn key_count(&self) -> usize {
        self.key_positions.len()
    }

    /// Decompose into key units. `None` when a non-key argument precedes
    /// the first key, since such a command cannot be split per key.
    pub fn key_units(&self) -> Option<Vec<KeyUnit>> {
        if self.key_positions.first() != Some(&1) {
            return None;
        }
        let mut units = Vec::with_capacity(self.key_positions.len());
        for (n, &start) in self.key_positions.iter().enumerate() {
            let end = self
                .key_positions
                .get(n + 1)
                .copied()
                .unwrap_or(self.parts.len());
            units.push(KeyUnit {
                key: self.parts[start].clone(),
                args: self.parts[start + 1..end].to_vec(),
            });
        }
        Some(units)
    }

    /// Append the RESP array encoding of this command to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(b'*');
        out.extend_from_slice(self.parts.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        for part in &self.parts {
            out.push(b'$');
            out.extend_from_slice(part.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(part);
            out.extend_from_slice(b"\r\n");
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        for part in self.args() {
            let text = String::from_utf8_lossy(part);
            if text.chars().count() > 32 {
                let short: String = text.chars().take(32).collect();
                write!(f, " {}...", short)?;
            } else {
                write!(f, " {}", text)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cmd({})", self)
    }
}

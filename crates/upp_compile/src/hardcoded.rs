//! The hardcoded function table and the host interface behind it.
//!
//! A fixed extern table binds a handful of names to host-provided
//! implementations callable from Upp code. IO and randomness go through
//! the [`Host`] trait so tests can capture output and script input;
//! `malloc_size_i32`/`free_pointer` are handled by the interpreter's
//! heap directly and never reach the host.

use std::io::{BufRead, Write};

use upp_base::Ident;

/// The hardcoded functions, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardcodedFunction {
    PrintI32,
    PrintF32,
    PrintBool,
    PrintString,
    PrintLine,
    ReadI32,
    ReadF32,
    ReadBool,
    RandomI32,
    MallocSizeI32,
    FreePointer,
}

impl HardcodedFunction {
    pub const ALL: [HardcodedFunction; 11] = [
        HardcodedFunction::PrintI32,
        HardcodedFunction::PrintF32,
        HardcodedFunction::PrintBool,
        HardcodedFunction::PrintString,
        HardcodedFunction::PrintLine,
        HardcodedFunction::ReadI32,
        HardcodedFunction::ReadF32,
        HardcodedFunction::ReadBool,
        HardcodedFunction::RandomI32,
        HardcodedFunction::MallocSizeI32,
        HardcodedFunction::FreePointer,
    ];

    /// The name the function is bound to in Upp code.
    pub fn name(self) -> &'static str {
        match self {
            HardcodedFunction::PrintI32 => "print_i32",
            HardcodedFunction::PrintF32 => "print_f32",
            HardcodedFunction::PrintBool => "print_bool",
            HardcodedFunction::PrintString => "print_string",
            HardcodedFunction::PrintLine => "print_line",
            HardcodedFunction::ReadI32 => "read_i32",
            HardcodedFunction::ReadF32 => "read_f32",
            HardcodedFunction::ReadBool => "read_bool",
            HardcodedFunction::RandomI32 => "random_i32",
            HardcodedFunction::MallocSizeI32 => "malloc_size_i32",
            HardcodedFunction::FreePointer => "free_pointer",
        }
    }

    pub fn by_ident(pool_resolved: &str) -> Option<HardcodedFunction> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == pool_resolved)
    }

    /// Interns every hardcoded name, returning `(ident, function)` pairs
    /// for symbol-table registration.
    pub fn interned_table() -> Vec<(Ident, HardcodedFunction)> {
        let pool = upp_base::identifier_pool();
        let mut lock = pool.lock();
        Self::ALL
            .into_iter()
            .map(|f| (lock.intern(f.name()), f))
            .collect()
    }
}

/// Host services used by the hardcoded functions.
pub trait Host {
    fn print(&mut self, text: &str);
    fn read_i32(&mut self) -> i32;
    fn read_f32(&mut self) -> f32;
    fn read_bool(&mut self) -> bool;
    fn random_i32(&mut self) -> i32;
}

/// Production host: stdout/stdin plus a thread-local RNG.
#[derive(Default)]
pub struct StdHost;

impl StdHost {
    fn read_line() -> String {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        line
    }
}

impl Host for StdHost {
    fn print(&mut self, text: &str) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = lock.write_all(text.as_bytes());
        let _ = lock.flush();
    }

    fn read_i32(&mut self) -> i32 {
        Self::read_line().trim().parse().unwrap_or(0)
    }

    fn read_f32(&mut self) -> f32 {
        Self::read_line().trim().parse().unwrap_or(0.0)
    }

    fn read_bool(&mut self) -> bool {
        matches!(Self::read_line().trim(), "true" | "1" | "yes")
    }

    fn random_i32(&mut self) -> i32 {
        rand::random()
    }
}

/// Test host: captures output, replays scripted inputs, deterministic
/// "random" numbers.
#[derive(Default)]
pub struct BufferedHost {
    pub output: String,
    pub int_inputs: Vec<i32>,
    pub float_inputs: Vec<f32>,
    pub bool_inputs: Vec<bool>,
    pub random_values: Vec<i32>,
}

impl Host for BufferedHost {
    fn print(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn read_i32(&mut self) -> i32 {
        if self.int_inputs.is_empty() {
            0
        } else {
            self.int_inputs.remove(0)
        }
    }

    fn read_f32(&mut self) -> f32 {
        if self.float_inputs.is_empty() {
            0.0
        } else {
            self.float_inputs.remove(0)
        }
    }

    fn read_bool(&mut self) -> bool {
        if self.bool_inputs.is_empty() {
            false
        } else {
            self.bool_inputs.remove(0)
        }
    }

    fn random_i32(&mut self) -> i32 {
        if self.random_values.is_empty() {
            4
        } else {
            self.random_values.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_unique() {
        for (i, a) in HardcodedFunction::ALL.iter().enumerate() {
            for b in &HardcodedFunction::ALL[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn lookup_by_name_round_trips() {
        for f in HardcodedFunction::ALL {
            assert_eq!(HardcodedFunction::by_ident(f.name()), Some(f));
        }
        assert_eq!(HardcodedFunction::by_ident("not_a_builtin"), None);
    }

    #[test]
    fn buffered_host_captures_and_replays() {
        let mut host = BufferedHost {
            int_inputs: vec![7],
            ..Default::default()
        };
        host.print("hi");
        assert_eq!(host.output, "hi");
        assert_eq!(host.read_i32(), 7);
        assert_eq!(host.read_i32(), 0);
    }
}

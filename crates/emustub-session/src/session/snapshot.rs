/// Values of the context registers at a given point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    word_size: usize,
    registers: Vec<(&'static str, u64)>,
}

impl RegisterSnapshot {
    pub(super) fn new(word_size: usize, registers: Vec<(&'static str, u64)>) -> Self {
        Self {
            word_size,
            registers,
        }
    }

    /// Returns the value of a register, given its name.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.registers
            .iter()
            .find_map(|(n, v)| n.eq_ignore_ascii_case(name).then_some(*v))
    }

    /// Returns an iterator over the register names and values, in context
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.registers.iter().copied()
    }
}

impl std::fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name_width = self
            .registers
            .iter()
            .map(|(n, _)| n.len())
            .max()
            .unwrap_or_default();
        let digits = self.word_size * 2;

        for (i, (name, value)) in self.registers.iter().enumerate() {
            if i > 0 {
                if i % 4 == 0 {
                    writeln!(f)?;
                } else {
                    f.write_str("  ")?;
                }
            }

            write!(f, "{name:>name_width$}={value:0digits$x}")?;
        }

        Ok(())
    }
}

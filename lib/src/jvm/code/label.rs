use std::fmt;

/// Symbolic jump target inside one method body
///
/// Labels are placed at most once, between two operations. Branches and exception table entries
/// refer to them before or after they are placed.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(u32);

impl Label {
    /// Get the next fresh label
    pub fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, formatter)
    }
}

/// Hands out labels which are distinct from each other
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone, Debug, Default)]
pub struct LabelGenerator(u32);

impl LabelGenerator {
    pub fn new() -> LabelGenerator {
        LabelGenerator(0)
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> Label {
        let to_return = Label(self.0);
        self.0 += 1;
        to_return
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_labels_are_distinct() {
        let mut generator = LabelGenerator::new();
        let a = generator.fresh_label();
        let b = generator.fresh_label();
        assert_ne!(a, b);
        assert_eq!(a.next(), b);
        assert_eq!(format!("{:?}", b), "l1");
    }
}

use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Sensitive value (PIN, card number) that never shows up in Debug or Display output.
///
/// Serialization passes the real value through: the opaque payloads handed to the
/// host must stay intact, only log lines are masked.
#[derive(Clone, Deserialize, PartialEq, Eq, Hash)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Masked(value)
    }
}

impl Masked<String> {
    /// Last four characters, the only part of a card number that may be logged
    pub fn tail(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let start = chars.len().saturating_sub(4);
        chars[start..].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_value_in_logs() {
        let pin = Masked("777".to_string());
        assert_eq!(format!("{:?}", pin), "********");
        assert_eq!(pin.to_string(), "********");
        assert_eq!(pin.expose(), "777");
    }

    #[test]
    fn test_masked_serializes_real_value() {
        let card = Masked("123456".to_string());
        assert_eq!(serde_json::to_string(&card).unwrap(), "\"123456\"");
        assert_eq!(card.tail(), "3456");
        assert_eq!(Masked("12".to_string()).tail(), "12");
    }
}

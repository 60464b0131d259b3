//! The closed set of categories a transaction can be filed under.

use std::fmt::Display;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A label describing what a transaction was for.
///
/// The set is closed so that aggregation can group on known values, with
/// [Category::Other] as the fallback for anything that does not fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Food and dining.
    Food,
    /// Transport.
    Transport,
    /// Housing and rent.
    Housing,
    /// Health and medical.
    Health,
    /// Shopping.
    Shopping,
    /// Education.
    Education,
    /// Salary.
    Salary,
    /// Freelance work.
    Freelance,
    /// Investments.
    Investment,
    /// Gifts.
    Gift,
    /// Anything that does not fit the other categories.
    #[default]
    Other,
}

impl Category {
    /// All categories, in declaration order.
    pub const ALL: [Category; 11] = [
        Category::Food,
        Category::Transport,
        Category::Housing,
        Category::Health,
        Category::Shopping,
        Category::Education,
        Category::Salary,
        Category::Freelance,
        Category::Investment,
        Category::Gift,
        Category::Other,
    ];

    /// The lowercase name used in the API and the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Housing => "housing",
            Category::Health => "health",
            Category::Shopping => "shopping",
            Category::Education => "education",
            Category::Salary => "salary",
            Category::Freelance => "freelance",
            Category::Investment => "investment",
            Category::Gift => "gift",
            Category::Other => "other",
        }
    }

    /// Parse a category from its lowercase name.
    ///
    /// Returns `None` for names outside the closed set. Callers decide whether
    /// that is a validation error (create/update) or simply matches nothing
    /// (filtering).
    pub fn parse(value: &str) -> Option<Self> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        Category::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown category {text:?}").into()))
    }
}

#[cfg(test)]
mod category_tests {
    use rusqlite::Connection;

    use super::Category;

    #[test]
    fn parse_round_trips_every_category() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn parse_rejects_unknown_name() {
        assert_eq!(Category::parse("lottery"), None);
        assert_eq!(Category::parse(""), None);
        // The names are lowercase only.
        assert_eq!(Category::parse("Food"), None);
    }

    #[test]
    fn default_is_other() {
        assert_eq!(Category::default(), Category::Other);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(
            serde_json::to_string(&Category::Transport).unwrap(),
            "\"transport\""
        );
        assert_eq!(
            serde_json::from_str::<Category>("\"salary\"").unwrap(),
            Category::Salary
        );
        assert!(serde_json::from_str::<Category>("\"lottery\"").is_err());
    }

    #[test]
    fn sql_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE example (category TEXT NOT NULL)", ())
            .unwrap();
        conn.execute(
            "INSERT INTO example (category) VALUES (?1)",
            (Category::Housing,),
        )
        .unwrap();

        let got: Category = conn
            .query_row("SELECT category FROM example", [], |row| row.get(0))
            .unwrap();

        assert_eq!(got, Category::Housing);
    }
}

use crate::{db::adapter::Dialect, model::FieldKind};

///
/// PostgresDialect
///

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn driver_name(&self) -> &'static str {
        "postgres"
    }

    /// `?` → `$1`, `$2`, … skipping quoted literals and identifiers.
    fn rebind(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut n = 0;
        let mut quote: Option<char> = None;

        for c in sql.chars() {
            match (quote, c) {
                (None, '\'' | '"') => {
                    quote = Some(c);
                    out.push(c);
                }
                (Some(q), c) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (None, '?') => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(c),
            }
        }

        out
    }

    fn column_type(&self, kind: FieldKind) -> &'static str {
        match kind {
            FieldKind::Binary => "BYTEA",
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::Char | FieldKind::Selection => "VARCHAR",
            FieldKind::Date => "DATE",
            FieldKind::DateTime => "TIMESTAMP WITHOUT TIME ZONE",
            FieldKind::Float => "NUMERIC",
            FieldKind::Integer
            | FieldKind::Many2One
            | FieldKind::One2One
            | FieldKind::One2Many
            | FieldKind::Many2Many
            | FieldKind::Rev2One => "INTEGER",
            FieldKind::Text => "TEXT",
        }
    }

    fn primary_key(&self) -> &'static str {
        "SERIAL PRIMARY KEY"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebind_numbers_placeholders_outside_quotes() {
        let sql = r#"SELECT "a?" FROM "t" WHERE x = ? AND y LIKE '?%' AND z IN (?, ?)"#;

        assert_eq!(
            PostgresDialect.rebind(sql),
            r#"SELECT "a?" FROM "t" WHERE x = $1 AND y LIKE '?%' AND z IN ($2, $3)"#
        );
    }
}

//! SQL assembly for the `users` table.
//!
//! Every value ends up as a `$n` placeholder with its argument in
//! [`Statement::params`]; nothing caller-supplied is spliced into the text.
//! Conditions and assignments come from fixed, ordered lists so the output is
//! stable byte for byte.
//!
//! `Statement` stands in for `sqlx::QueryBuilder` because the bound values
//! have to stay inspectable; `repo` binds them when executing.

use std::fmt::Write;

use super::repo_types::{Filter, Page, UserPatch};

pub const USERS_TABLE: &str = "users";

pub const USER_COLUMNS: &str =
    "id, first_name, last_name, nick_name, password, email, country, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn push_bind(&mut self, param: Param) {
        self.params.push(param);
        // writing into a String cannot fail
        let _ = write!(self.sql, "${}", self.params.len());
    }
}

#[derive(Debug, Clone, Copy)]
enum Predicate {
    Equals,
    Contains,
}

fn filter_terms(filter: &Filter) -> [(&'static str, Predicate, Option<&str>); 2] {
    [
        ("country", Predicate::Equals, filter.country.as_deref()),
        ("nick_name", Predicate::Contains, filter.nick_name.as_deref()),
    ]
}

fn assignments(patch: &UserPatch) -> [(&'static str, Option<&str>); 6] {
    [
        ("first_name", patch.first_name.as_deref()),
        ("last_name", patch.last_name.as_deref()),
        ("nick_name", patch.nick_name.as_deref()),
        ("email", patch.email.as_deref()),
        ("country", patch.country.as_deref()),
        ("password", patch.password_hash.as_deref()),
    ]
}

/// Escapes LIKE metacharacters so the value matches literally.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_where(stmt: &mut Statement, filter: &Filter) {
    let mut joiner = " WHERE ";
    for (column, predicate, value) in filter_terms(filter) {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        stmt.push(joiner);
        stmt.push(column);
        match predicate {
            Predicate::Equals => {
                stmt.push(" = ");
                stmt.push_bind(Param::Text(value.to_owned()));
            }
            Predicate::Contains => {
                stmt.push(" LIKE ");
                stmt.push_bind(Param::Text(format!("%{}%", escape_like(value))));
            }
        }
        joiner = " AND ";
    }
}

/// Page of users matching `filter`, ordered by id.
pub fn build_select(filter: &Filter, page: Page) -> Statement {
    let mut stmt = Statement::new(format!("SELECT {USER_COLUMNS} FROM {USERS_TABLE}"));
    push_where(&mut stmt, filter);
    stmt.push(" ORDER BY id LIMIT ");
    stmt.push_bind(Param::Int(page.limit()));
    stmt.push(" OFFSET ");
    stmt.push_bind(Param::Int(page.offset()));
    stmt
}

/// Number of users matching `filter`.
pub fn build_count(filter: &Filter) -> Statement {
    let mut stmt = Statement::new(format!("SELECT count(*) AS total FROM {USERS_TABLE}"));
    push_where(&mut stmt, filter);
    stmt
}

/// Assigns every present field of `patch` and refreshes `updated_at`.
///
/// A patch with no fields still yields a valid, timestamp-only update; the
/// service rejects such requests before they get here.
pub fn build_update(patch: &UserPatch, table: &str) -> Statement {
    let mut stmt = Statement::new(format!("UPDATE {table} SET "));
    for (column, value) in assignments(patch) {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        stmt.push(column);
        stmt.push(" = ");
        stmt.push_bind(Param::Text(value.to_owned()));
        stmt.push(", ");
    }
    stmt.push("updated_at = now() WHERE id = ");
    stmt.push_bind(Param::Int(patch.id));
    stmt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(v: &str) -> Param {
        Param::Text(v.to_string())
    }

    fn page(number: u32, size: u32) -> Page {
        Page::new(number, size).expect("valid page")
    }

    #[test]
    fn select_without_filter_has_no_where() {
        let stmt = build_select(&Filter::default(), page(1, 10));
        assert_eq!(
            stmt.sql,
            "SELECT id, first_name, last_name, nick_name, password, email, country, created_at, updated_at \
             FROM users ORDER BY id LIMIT $1 OFFSET $2"
        );
        assert_eq!(stmt.params, vec![Param::Int(10), Param::Int(0)]);
    }

    #[test]
    fn select_by_country_only() {
        let filter = Filter {
            country: Some("UK".into()),
            nick_name: None,
        };
        let stmt = build_select(&filter, page(1, 10));
        assert!(stmt.sql.ends_with(" FROM users WHERE country = $1 ORDER BY id LIMIT $2 OFFSET $3"));
        assert_eq!(stmt.sql.matches("country = ").count(), 1);
        assert!(!stmt.sql.contains("nick_name LIKE"));
        assert_eq!(stmt.params, vec![text("UK"), Param::Int(10), Param::Int(0)]);
    }

    #[test]
    fn select_by_nickname_only() {
        let filter = Filter {
            country: None,
            nick_name: Some("test".into()),
        };
        let stmt = build_select(&filter, page(1, 10));
        assert!(stmt.sql.ends_with(" FROM users WHERE nick_name LIKE $1 ORDER BY id LIMIT $2 OFFSET $3"));
        assert_eq!(stmt.params[0], text("%test%"));
    }

    #[test]
    fn select_with_both_fields_keeps_country_first() {
        let filter = Filter {
            country: Some("UK".into()),
            nick_name: Some("test".into()),
        };
        let stmt = build_select(&filter, page(2, 10));
        assert!(stmt.sql.ends_with(
            " FROM users WHERE country = $1 AND nick_name LIKE $2 ORDER BY id LIMIT $3 OFFSET $4"
        ));
        assert_eq!(
            stmt.params,
            vec![text("UK"), text("%test%"), Param::Int(10), Param::Int(10)]
        );
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let filter = Filter {
            country: Some(String::new()),
            nick_name: Some(String::new()),
        };
        let stmt = build_count(&filter);
        assert_eq!(stmt.sql, "SELECT count(*) AS total FROM users");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn count_uses_same_conditions() {
        let filter = Filter {
            country: Some("UK".into()),
            nick_name: Some("test".into()),
        };
        let stmt = build_count(&filter);
        assert_eq!(
            stmt.sql,
            "SELECT count(*) AS total FROM users WHERE country = $1 AND nick_name LIKE $2"
        );
        assert_eq!(stmt.params, vec![text("UK"), text("%test%")]);
    }

    #[test]
    fn hostile_values_stay_out_of_the_sql_text() {
        let filter = Filter {
            country: Some("UK\"; DROP TABLE users; --".into()),
            nick_name: Some("50%_off\\".into()),
        };
        let stmt = build_count(&filter);
        assert!(!stmt.sql.contains("DROP"));
        assert_eq!(stmt.params[0], text("UK\"; DROP TABLE users; --"));
        assert_eq!(stmt.params[1], text("%50\\%\\_off\\\\%"));
    }

    #[test]
    fn update_first_name_only() {
        let patch = UserPatch {
            first_name: Some("test".into()),
            ..UserPatch::new(1)
        };
        let stmt = build_update(&patch, USERS_TABLE);
        assert_eq!(
            stmt.sql,
            "UPDATE users SET first_name = $1, updated_at = now() WHERE id = $2"
        );
        assert_eq!(stmt.params, vec![text("test"), Param::Int(1)]);
    }

    #[test]
    fn update_follows_fixed_column_order() {
        let patch = UserPatch {
            id: 9,
            country: Some("UK".into()),
            password_hash: Some("$argon2id$hash".into()),
            first_name: Some("a".into()),
            nick_name: Some("b".into()),
            last_name: None,
            email: Some("c@d.io".into()),
        };
        let stmt = build_update(&patch, USERS_TABLE);
        assert_eq!(
            stmt.sql,
            "UPDATE users SET first_name = $1, nick_name = $2, email = $3, country = $4, \
             password = $5, updated_at = now() WHERE id = $6"
        );
        assert_eq!(stmt.params.last(), Some(&Param::Int(9)));
    }

    #[test]
    fn update_without_fields_only_touches_timestamp() {
        let stmt = build_update(&UserPatch::new(4), "accounts");
        assert_eq!(stmt.sql, "UPDATE accounts SET updated_at = now() WHERE id = $1");
        assert_eq!(stmt.params, vec![Param::Int(4)]);
    }
}

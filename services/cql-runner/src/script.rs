use anyhow::{bail, Result};

/// Split a CQL script on `;`, skipping `--` and `//` comment lines.
/// Semicolons inside single-quoted literals do not split.
pub fn split_statements(source: &str) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;

    for line in source.lines() {
        let trimmed = line.trim_start();
        if !in_string && (trimmed.starts_with("--") || trimmed.starts_with("//")) {
            continue;
        }

        for c in line.chars() {
            match c {
                '\'' => {
                    in_string = !in_string;
                    current.push(c);
                }
                ';' if !in_string => push_statement(&mut statements, &mut current),
                _ => current.push(c),
            }
        }
        current.push('\n');
    }

    if in_string {
        bail!("Unterminated string literal in script");
    }
    push_statement(&mut statements, &mut current);
    Ok(statements)
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements() {
        let script = "-- seed data\n\
                      INSERT INTO posts (id, title)\n  VALUES (1, 'a;b');\n\
                      // second\n\
                      SELECT * FROM posts;\n\n";

        let statements = split_statements(script).unwrap();
        assert_eq!(
            statements,
            vec![
                "INSERT INTO posts (id, title)\n  VALUES (1, 'a;b')".to_string(),
                "SELECT * FROM posts".to_string(),
            ]
        );
    }

    #[test]
    fn test_trailing_statement_without_semicolon() {
        assert_eq!(
            split_statements("TRUNCATE posts").unwrap(),
            vec!["TRUNCATE posts".to_string()]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(split_statements("INSERT INTO posts (title) VALUES ('oops);").is_err());
    }
}

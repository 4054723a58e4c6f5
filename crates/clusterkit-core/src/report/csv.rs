//! Minimal RFC 4180 reading and writing for the report files.

/// Quote a field when it contains the delimiter, a quote or a line break.
pub fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r')
    {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn format_record<S: AsRef<str>>(fields: &[S], delimiter: char) -> String {
    let sep = delimiter.to_string();
    fields
        .iter()
        .map(|f| escape_field(f.as_ref(), delimiter))
        .collect::<Vec<_>>()
        .join(&sep)
}

/// Split one line into fields, honouring double quotes. Records spanning
/// several lines are not supported; none of the inputs produce them.
pub fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

/// Read a delimited file into rows, skipping the header and blank lines.
pub fn read_rows(path: &std::path::Path, delimiter: char) -> std::io::Result<Vec<Vec<String>>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| split_record(l, delimiter))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain", ','), "plain");
        assert_eq!(escape_field("a,b", ','), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\"", ','), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("a,b", '\t'), "a,b");
    }

    #[test]
    fn test_split_record_quotes() {
        assert_eq!(
            split_record("a,\"b,c\",\"d \"\"e\"\"\",", ','),
            vec!["a", "b,c", "d \"e\"", ""]
        );
    }

    #[test]
    fn test_split_record_tabs() {
        assert_eq!(split_record("/a\t0\t2022-01-01 10:00\r\n", '\t'), vec!["/a", "0", "2022-01-01 10:00"]);
    }

    #[test]
    fn test_format_then_split() {
        let fields = ["x", "has,comma", "has \"quote\""];
        let line = format_record(&fields, ',');
        assert_eq!(split_record(&line, ','), fields);
    }
}

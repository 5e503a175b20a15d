//! Job file inspection
//!
//! Line-level helpers over job file content:
//! - Locating the dataset reference on the `$DATA` record
//! - Shifting that reference one directory deeper for a staged copy
//! - Listing output files the job declares (`$TABLE FILE=`, `$EST MSFO=`)

/// Marker of the record naming the dataset
pub const DATA_RECORD: &str = "$DATA";

/// Byte range of the dataset path token on a `$DATA` line
///
/// Quotes are not part of the range.
fn data_token_range(line: &str) -> Option<(usize, usize)> {
    let marker = line.find(DATA_RECORD)?;
    let after = marker + DATA_RECORD.len();
    let rest = &line[after..];
    let skipped = rest.len() - rest.trim_start().len();
    let start = after + skipped;
    let token = &line[start..];

    let quote = token.chars().next().filter(|c| *c == '"' || *c == '\'');
    match quote {
        Some(q) => {
            let inner = &token[1..];
            let end = inner.find(q).unwrap_or(inner.len());
            Some((start + 1, start + 1 + end))
        }
        None => {
            let end = token.find(char::is_whitespace).unwrap_or(token.len());
            if end == 0 {
                None
            } else {
                Some((start, start + end))
            }
        }
    }
}

fn is_absolute_reference(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() > 1 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic())
}

/// Dataset path named by the first `$DATA` line, if any
pub fn find_data_path(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        data_token_range(line).map(|(start, end)| line[start..end].to_string())
    })
}

/// Rewrites a `$DATA` line so its relative path works one directory deeper
///
/// Absolute paths and lines without a dataset token are returned as is.
pub fn add_path_level_to_data(line: &str) -> String {
    match data_token_range(line) {
        Some((start, end)) if !is_absolute_reference(&line[start..end]) => {
            format!("{}../{}", &line[..start], &line[start..])
        }
        _ => line.to_string(),
    }
}

/// Output files declared by the job file
///
/// `FILE=` tokens of `$TABLE` records and `MSFO=` tokens of `$EST` /
/// `$ESTIMATION` records, in order of appearance, without duplicates.
/// Comments (after `;`) are ignored.
pub fn find_output_files(lines: &[String]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    let mut record = String::new();

    for raw in lines {
        let line = raw.split(';').next().unwrap_or_default();
        let trimmed = line.trim_start();

        if let Some(name) = trimmed.strip_prefix('$') {
            record = name
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase();
        }

        let key = match record.as_str() {
            "TABLE" | "TAB" => "FILE=",
            "EST" | "ESTIMATION" => "MSFO=",
            _ => continue,
        };

        for token in trimmed.split_whitespace() {
            let Some(prefix) = token.get(..key.len()) else {
                continue;
            };
            if token.len() == key.len() || !prefix.eq_ignore_ascii_case(key) {
                continue;
            }
            let file = token[key.len()..].trim_matches(|c| c == '"' || c == '\'');
            if !file.is_empty() && !files.iter().any(|f| f == file) {
                files.push(file.to_string());
            }
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_add_path_level_relative() {
        assert_eq!(
            add_path_level_to_data("$DATA ../data/acop.csv IGNORE=@"),
            "$DATA ../../data/acop.csv IGNORE=@"
        );
        assert_eq!(add_path_level_to_data("$DATA acop.csv"), "$DATA ../acop.csv");
    }

    #[test]
    fn test_add_path_level_quoted() {
        assert_eq!(
            add_path_level_to_data("$DATA \"my data/acop.csv\" IGNORE=#"),
            "$DATA \"../my data/acop.csv\" IGNORE=#"
        );
    }

    #[test]
    fn test_add_path_level_absolute_untouched() {
        assert_eq!(
            add_path_level_to_data("$DATA /shared/acop.csv"),
            "$DATA /shared/acop.csv"
        );
        assert_eq!(add_path_level_to_data("$DATA"), "$DATA");
    }

    #[test]
    fn test_find_data_path() {
        let content = lines("$PROB test\n$INPUT ID TIME DV\n$DATA  '../acop.csv' IGNORE=@\n");
        assert_eq!(find_data_path(&content), Some("../acop.csv".to_string()));
        assert_eq!(find_data_path(&lines("$PROB only")), None);
    }

    #[test]
    fn test_find_output_files() {
        let content = lines(
            "$PROB run001\n\
             $EST METHOD=1 INTER MAXEVAL=9999 MSFO=run001.msf\n\
             $TABLE ID TIME DV NOPRINT ONEHEADER\n  FILE=run001.tab ; comment FILE=ignored\n\
             $TABLE ID CL V FILE=run001par.tab\n\
             $TABLE ID FILE=run001.tab\n\
             $COV PRINT=E FILE=notatable",
        );

        assert_eq!(
            find_output_files(&content),
            vec!["run001.msf", "run001.tab", "run001par.tab"]
        );
    }

    #[test]
    fn test_find_output_files_empty() {
        assert!(find_output_files(&[]).is_empty());
    }
}

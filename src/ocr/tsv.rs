// Parser for Tesseract's TSV output format.
//
// Columns: level page_num block_num par_num line_num word_num
//          left top width height conf text
// Level 5 rows are recognized words; lower levels describe page, block,
// paragraph, and line geometry and carry conf -1.

use tracing::warn;

use crate::types::{BBox, OcrWord};

const WORD_LEVEL: u32 = 5;
const COLUMNS: usize = 12;

/// Parse TSV text into words. Malformed rows are logged and skipped, so a
/// partially garbled page still yields every parseable word.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();
    for (idx, line) in tsv.lines().enumerate() {
        if idx == 0 && line.starts_with("level") {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line) {
            Ok(Some(word)) => words.push(word),
            Ok(None) => {}
            Err(err) => warn!(row = idx + 1, "skipping malformed TSV row: {err}"),
        }
    }
    words
}

fn parse_row(line: &str) -> Result<Option<OcrWord>, String> {
    // splitn keeps tabs inside the trailing text column intact
    let fields: Vec<&str> = line.splitn(COLUMNS, '\t').collect();
    if fields.len() < COLUMNS - 1 {
        return Err(format!("{} of {} columns", fields.len(), COLUMNS));
    }

    let level: u32 = num(fields[0], "level")?;
    if level != WORD_LEVEL {
        return Ok(None);
    }

    let block: u32 = num(fields[2], "block_num")?;
    let paragraph: u32 = num(fields[3], "par_num")?;
    let line_num: u32 = num(fields[4], "line_num")?;
    let word_num: u32 = num(fields[5], "word_num")?;
    let left: u32 = num(fields[6], "left")?;
    let top: u32 = num(fields[7], "top")?;
    let width: u32 = num(fields[8], "width")?;
    let height: u32 = num(fields[9], "height")?;
    let confidence: f32 = fields[10]
        .trim()
        .parse()
        .map_err(|_| format!("bad conf '{}'", fields[10]))?;
    let text = fields.get(11).map(|s| s.trim_end_matches('\r')).unwrap_or("");

    Ok(Some(OcrWord {
        text: text.to_string(),
        confidence,
        bbox: BBox::new(left, top, width, height),
        block,
        paragraph,
        line: line_num,
        word: word_num,
    }))
}

fn num<T: std::str::FromStr>(field: &str, name: &str) -> Result<T, String> {
    field
        .trim()
        .parse()
        .map_err(|_| format!("bad {name} '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2550\t3300\t-1\t
2\t1\t1\t0\t0\t0\t358\t283\t1834\t560\t-1\t
3\t1\t1\t1\t0\t0\t358\t283\t1834\t236\t-1\t
4\t1\t1\t1\t1\t0\t358\t283\t1834\t48\t-1\t
5\t1\t1\t1\t1\t1\t358\t283\t151\t39\t96.063843\tHello
5\t1\t1\t1\t1\t2\t542\t284\t198\t47\t91.457840\tworld,
5\t1\t1\t1\t2\t1\t358\t350\t120\t40\t45.0\tsmudge
";

    #[test]
    fn keeps_only_word_rows() {
        let words = parse_tsv(SAMPLE);
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "Hello");
        assert_eq!(words[1].text, "world,");
        assert_eq!(words[2].text, "smudge");
    }

    #[test]
    fn parses_geometry_and_confidence() {
        let words = parse_tsv(SAMPLE);
        let w = &words[0];
        assert_eq!(w.bbox, BBox::new(358, 283, 151, 39));
        assert!((w.confidence - 96.063843).abs() < 1e-4);
        assert_eq!((w.block, w.paragraph, w.line, w.word), (1, 1, 1, 1));
        assert_eq!(words[2].line, 2);
    }

    #[test]
    fn skips_malformed_rows() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   5\t1\t1\t1\t1\t1\tnot_a_number\t10\t20\t30\t90.0\tbroken\n\
                   garbage line without tabs\n\
                   5\t1\t1\t1\t1\t2\t100\t10\t20\t30\t90.0\tok\n";
        let words = parse_tsv(tsv);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "ok");
    }

    #[test]
    fn empty_input_gives_no_words() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n").is_empty());
    }

    #[test]
    fn integer_conf_rows_parse() {
        let tsv = "5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t-1\t\n\
                   5\t1\t1\t1\t1\t2\t10\t10\t50\t20\t87\tword\n";
        let words = parse_tsv(tsv);
        assert_eq!(words.len(), 2);
        assert!((words[1].confidence - 87.0).abs() < f32::EPSILON);
    }

    #[test]
    fn windows_line_endings_are_trimmed() {
        let tsv = "5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t91.2\tcrlf\r\n";
        let words = parse_tsv(tsv);
        assert_eq!(words[0].text, "crlf");
    }
}

// ============================================================================
// File: src/formatter.rs
// Sanitizes model text and renders it as a structured document
// ============================================================================

use colored::*;
use regex::Regex;
use std::sync::LazyLock;

/// Characters the models use as markdown-ish control marks.
const FORBIDDEN: [char; 4] = ['#', '*', '\'', '`'];

const SECTION_LABELS: &[&str] = &[
    "Introduction", "Conclusion", "Body", "Opening", "Closing", "Dear", "Subject", "Date", "To",
    "From", "Paragraph", "Para", "Section", "Part", "Chapter", "Arguments", "Counter", "Rebuttal",
    "Hook", "Intro", "Main Content", "Call to Action", "Outro", "Summary", "Abstract", "Overview",
    "Background", "Details", "Examples", "Analysis", "Discussion", "Results", "Findings",
    "Key Points", "Important Notes", "Benefits", "Advantages", "Disadvantages", "Challenges",
    "Solutions", "Methods", "Approaches", "Strategies", "Tips", "Best Practices",
    "Recommendations", "Final Thoughts", "Next Steps",
];

const EMPHASIS_WORDS: &[&str] = &[
    "Important", "Importantly", "Key Point", "Key", "Note", "Conclusion", "Summary",
    "Introduction", "Therefore", "However", "Moreover", "Furthermore", "In conclusion",
    "To summarize", "In summary", "First", "Second", "Third", "Finally", "Firstly", "Secondly",
    "Thirdly", "Lastly", "Main Point", "Main", "For example", "For instance",
    "On the other hand", "In addition", "As a result", "Consequently", "Meanwhile",
    "Nevertheless", "Regardless", "Significantly", "Notably", "Essentially", "Fundamentally",
    "Critically", "Respectfully", "Sincerely", "Regards", "Faithfully", "Yours truly",
    "Thank you", "Dear Sir", "Dear Madam", "Dear Teacher", "To Whom", "Subject", "Reference",
    "Opening Statement", "Closing Statement", "Ladies and Gentlemen", "Honourable",
    "Distinguished", "Respected", "Evidence", "Example", "Result", "Moral", "Lesson", "Thus",
    "Hence", "Also", "Additionally", "Similarly", "Likewise", "Besides", "Indeed", "Certainly",
    "Obviously", "Clearly", "Undoubtedly", "Definitely", "Absolutely", "Positively", "Success",
    "Successful", "Benefit", "Benefits", "Advantage", "Advantages", "Basically",
];

static SECTION_LABEL: LazyLock<Regex> = LazyLock::new(|| alternation(r"(?i)^(?:", SECTION_LABELS, r")\b"));

static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| alternation(r"(?i)\b(?:", EMPHASIS_WORDS, r")\b"));

/// Longest phrases first so "In conclusion" beats "Conclusion".
fn alternation(prefix: &str, words: &[&str], suffix: &str) -> Regex {
    let mut sorted: Vec<&str> = words.to_vec();
    sorted.sort_by_key(|w| std::cmp::Reverse(w.len()));
    let body = sorted.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    Regex::new(&format!("{}{}{}", prefix, body, suffix)).expect("static vocabulary compiles")
}

/// Removes the characters that could forge markup and normalizes dashes.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !FORBIDDEN.contains(c))
        .collect::<String>()
        .replace('\u{2014}', " - ")
        .trim()
        .to_string()
}

/// Sanitizes and renders `text` as HTML. Empty input yields an empty string.
///
/// The output is terminal: feeding it back in will re-detect its own
/// structure as text.
pub fn format(text: &str) -> String {
    Document::parse(text).render_html()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Emphasis(String),
    LineBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Heading(String),
    Paragraph(Vec<Inline>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        let cleaned = sanitize(text);
        let lines: Vec<&str> = cleaned.split('\n').map(str::trim).collect();

        let mut blocks = Vec::new();
        let mut paragraph: Vec<Inline> = Vec::new();
        let mut title_rendered = false;
        let mut blank_run = 0usize;

        for (i, line) in lines.iter().enumerate() {
            if line.is_empty() {
                blank_run += 1;
                continue;
            }

            let after_blank = i > 0 && lines[i - 1].is_empty();
            let len = line.chars().count();

            if !title_rendered && len > 3 && len < 200 {
                flush(&mut paragraph, &mut blocks);
                blocks.push(Block::Title(line.to_string()));
                title_rendered = true;
            } else if is_heading(line, after_blank) {
                flush(&mut paragraph, &mut blocks);
                blocks.push(Block::Heading(line.to_string()));
            } else {
                if !paragraph.is_empty() {
                    if blank_run > 0 {
                        flush(&mut paragraph, &mut blocks);
                    } else {
                        paragraph.push(Inline::LineBreak);
                    }
                }
                paragraph.extend(emphasize(line));
            }
            blank_run = 0;
        }
        flush(&mut paragraph, &mut blocks);

        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn render_html(&self) -> String {
        self.blocks
            .iter()
            .map(|block| match block {
                Block::Title(text) => format!("<h2>{}</h2>", escape_html(text)),
                Block::Heading(text) => format!("<h3>{}</h3>", escape_html(text)),
                Block::Paragraph(inlines) => {
                    let body: String = inlines
                        .iter()
                        .map(|inline| match inline {
                            Inline::Text(text) => escape_html(text),
                            Inline::Emphasis(text) => format!("<strong>{}</strong>", escape_html(text)),
                            Inline::LineBreak => "<br/>".to_string(),
                        })
                        .collect();
                    format!("<p>{}</p>", body)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render_terminal(&self) -> String {
        self.blocks
            .iter()
            .map(|block| match block {
                Block::Title(text) => text.bright_white().bold().to_string(),
                Block::Heading(text) => text.bold().to_string(),
                Block::Paragraph(inlines) => inlines
                    .iter()
                    .map(|inline| match inline {
                        Inline::Text(text) => text.clone(),
                        Inline::Emphasis(text) => text.bright_blue().bold().to_string(),
                        Inline::LineBreak => "\n".to_string(),
                    })
                    .collect(),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn flush(paragraph: &mut Vec<Inline>, blocks: &mut Vec<Block>) {
    if !paragraph.is_empty() {
        blocks.push(Block::Paragraph(std::mem::take(paragraph)));
    }
}

fn is_heading(line: &str, after_blank: bool) -> bool {
    if line.chars().count() >= 80 || line.ends_with(',') {
        return false;
    }
    line.ends_with(':')
        || SECTION_LABEL.is_match(line)
        || is_all_caps(line)
        || (starts_upper(line)
            && line.split_whitespace().count() <= 6
            && !line.ends_with('.')
            && after_blank)
}

fn is_all_caps(line: &str) -> bool {
    line.chars().count() > 2
        && line.chars().any(char::is_uppercase)
        && !line.chars().any(char::is_lowercase)
}

fn starts_upper(line: &str) -> bool {
    line.chars().next().is_some_and(char::is_uppercase)
}

fn emphasize(line: &str) -> Vec<Inline> {
    let mut out = Vec::new();
    let mut last = 0;
    for found in EMPHASIS.find_iter(line) {
        if found.start() > last {
            out.push(Inline::Text(line[last..found.start()].to_string()));
        }
        out.push(Inline::Emphasis(found.as_str().to_string()));
        last = found.end();
    }
    if last < line.len() {
        out.push(Inline::Text(line[last..].to_string()));
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(doc: &Document) -> usize {
        doc.blocks.iter().filter(|b| matches!(b, Block::Title(_))).count()
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert_eq!(format(""), "");
        assert_eq!(format("  \n\n  "), "");
    }

    #[test]
    fn sanitize_strips_control_marks() {
        assert_eq!(sanitize("## **Bold** `code` it's \u{2014} done  "), "Bold code its  -  done");
    }

    #[test]
    fn forbidden_characters_never_survive() {
        let noisy = "# Title #\n\n*** Note: `x` isn't ***\n'''\n###\n**However** it's fine";
        let out = format(noisy);
        for c in FORBIDDEN {
            assert!(!out.contains(c), "found {:?} in {}", c, out);
        }
    }

    #[test]
    fn first_eligible_line_becomes_the_only_title() {
        let doc = Document::parse("Hi\nPresent Perfect Tense\nAnother Candidate Line");
        assert_eq!(titles(&doc), 1);
        assert!(doc.blocks.contains(&Block::Title("Present Perfect Tense".to_string())));
    }

    #[test]
    fn title_is_promoted_once_even_after_blank_lines() {
        let doc = Document::parse("\n\nFirst Heading Here\n\nSecond Candidate\n\nThird one");
        assert_eq!(titles(&doc), 1);
        assert_eq!(doc.blocks[0], Block::Title("First Heading Here".to_string()));
    }

    #[test]
    fn overly_long_first_line_is_not_a_title() {
        let long = "word ".repeat(50);
        let doc = Document::parse(&format!("{}\nShort Title", long.trim()));
        assert_eq!(doc.blocks[1], Block::Title("Short Title".to_string()));
    }

    #[test]
    fn detects_section_headings() {
        let doc = Document::parse(
            "Grammar Guide\nDefinition:\nThe rule applies here.\nEXAMPLES\nit is used daily.\nSummary of usage\ndone.",
        );
        assert!(doc.blocks.contains(&Block::Heading("Definition:".to_string())));
        assert!(doc.blocks.contains(&Block::Heading("EXAMPLES".to_string())));
        assert!(doc.blocks.contains(&Block::Heading("Summary of usage".to_string())));
    }

    #[test]
    fn short_capitalized_line_needs_a_preceding_blank() {
        let doc = Document::parse("Title Line\nthe text here.\nCommon Mistakes\nmore text.\n\nCommon Mistakes");
        let headings: Vec<_> = doc
            .blocks
            .iter()
            .filter(|b| matches!(b, Block::Heading(_)))
            .collect();
        assert_eq!(headings, vec![&Block::Heading("Common Mistakes".to_string())]);
    }

    #[test]
    fn lower_case_section_label_is_a_heading() {
        let doc = Document::parse("Title Line\nsome text.\nbody of the letter");
        assert!(doc.blocks.contains(&Block::Heading("body of the letter".to_string())));
    }

    #[test]
    fn titles_and_headings_carry_no_emphasis() {
        let doc = Document::parse("Important Notes\nsome text.\nHowever Things:\nfinally done.");
        assert_eq!(doc.blocks[0], Block::Title("Important Notes".to_string()));
        assert!(doc.blocks.contains(&Block::Heading("However Things:".to_string())));
        let emphasized: Vec<_> = doc
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(inlines) => Some(inlines),
                _ => None,
            })
            .flatten()
            .filter(|i| matches!(i, Inline::Emphasis(_)))
            .collect();
        assert_eq!(emphasized, vec![&Inline::Emphasis("finally".to_string())]);
    }

    #[test]
    fn trailing_comma_blocks_heading() {
        let doc = Document::parse("Letter\n\nDear Sir,");
        assert!(!doc.blocks.iter().any(|b| matches!(b, Block::Heading(_))));
    }

    #[test]
    fn label_prefix_must_end_on_word_boundary() {
        let doc = Document::parse("Heading Line\ntoday we study verbs and more verbs.");
        assert!(!doc.blocks.iter().any(|b| matches!(b, Block::Heading(_))));
    }

    #[test]
    fn bangla_text_is_not_all_caps() {
        assert!(!is_all_caps("২ + ২ = ৪"));
        assert!(is_all_caps("STEP 1"));
    }

    #[test]
    fn emphasis_wraps_every_occurrence() {
        let inlines = emphasize("however, this is important. However it is KEY.");
        let emphasized: Vec<_> = inlines
            .iter()
            .filter_map(|i| match i {
                Inline::Emphasis(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(emphasized, vec!["however", "important", "However", "KEY"]);
    }

    #[test]
    fn longer_phrase_wins_without_nesting() {
        let inlines = emphasize("In conclusion the rule holds.");
        assert_eq!(inlines[0], Inline::Emphasis("In conclusion".to_string()));
        assert_eq!(inlines.len(), 2);
    }

    #[test]
    fn words_inside_other_words_are_left_alone() {
        assert_eq!(emphasize("keyboard alsoran"), vec![Inline::Text("keyboard alsoran".to_string())]);
    }

    #[test]
    fn paragraphs_and_breaks() {
        let html = format("The Title\nline one\nline two\n\n\n\nline three");
        assert_eq!(html, "<h2>The Title</h2>\n<p>line one<br/>line two</p>\n<p>line three</p>");
    }

    #[test]
    fn headings_are_never_wrapped_in_paragraphs() {
        let html = format("The Title\nsome text\nDefinition:\nmore text");
        assert_eq!(
            html,
            "<h2>The Title</h2>\n<p>some text</p>\n<h3>Definition:</h3>\n<p>more text</p>"
        );
        assert!(!html.contains("<p><h"));
        assert!(!html.contains("<p></p>"));
    }

    #[test]
    fn html_is_escaped() {
        let html = format("Compare\nx < y & y > z");
        assert!(html.contains("x &lt; y &amp; y &gt; z"));
    }

    #[test]
    fn terminal_rendering_keeps_text() {
        colored::control::set_override(false);
        let doc = Document::parse("The Title\nHowever, it works.");
        assert_eq!(doc.render_terminal(), "The Title\n\nHowever, it works.");
    }
}

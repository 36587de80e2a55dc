/// What the router should do for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    List,
    Read(String),
    Analyze(String),
    /// Anything that is not a sentinel; shown to the user as-is.
    Text(String),
}

const LIST_PHRASES: [&str; 4] = ["list the files", "list files", "show the files", "show files"];

const JOB_DESCRIPTION_KEYWORDS: [&str; 8] = [
    "requirements",
    "responsibilities",
    "qualifications",
    "job description",
    "we are looking for",
    "must have",
    "nice to have",
    "years of experience",
];

impl Instruction {
    /// Parse model output. Only the first line can carry a sentinel, and
    /// matching is case-sensitive.
    pub fn parse(output: &str) -> Self {
        let output = output.trim();
        let line = output.lines().next().unwrap_or_default().trim();
        let command = line.strip_prefix("ACTION:").unwrap_or(line);

        if command == "LIST" || command.starts_with("LIST_FILES") {
            return Self::List;
        }

        let named = |prefixes: &[&str]| {
            prefixes
                .iter()
                .find_map(|prefix| command.strip_prefix(prefix))
                .map(file_name)
                .filter(|name| !name.is_empty())
        };
        if let Some(name) = named(&["READ_FILE:", "READ:"]) {
            return Self::Read(name);
        }
        if let Some(name) = named(&["ANALYZE:"]) {
            return Self::Analyze(name);
        }

        Self::Text(output.to_string())
    }

    /// Instruction the user typed directly, bypassing the model.
    pub fn direct(input: &str) -> Option<Self> {
        let phrase = input
            .trim()
            .trim_end_matches(['.', '!', '?'])
            .trim()
            .to_lowercase();
        if LIST_PHRASES.contains(&phrase.as_str()) {
            return Some(Self::List);
        }

        match Self::parse(input) {
            Self::Text(_) => None,
            instruction => Some(instruction),
        }
    }
}

fn file_name(raw: &str) -> String {
    raw.trim().trim_matches(['"', '\'', '`']).trim().to_string()
}

/// Whether the text reads like a job posting.
pub fn is_job_description(text: &str) -> bool {
    let text = text.to_lowercase();
    JOB_DESCRIPTION_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sentinels() {
        let cases = [
            ("LIST", Instruction::List),
            ("ACTION:LIST_FILES", Instruction::List),
            ("  LIST_FILES\n", Instruction::List),
            ("READ:resume.pdf", Instruction::Read("resume.pdf".into())),
            ("ACTION:READ_FILE: cv.docx ", Instruction::Read("cv.docx".into())),
            ("READ_FILE:`notes.txt`", Instruction::Read("notes.txt".into())),
            ("ANALYZE:resume.pdf", Instruction::Analyze("resume.pdf".into())),
            ("ACTION:ANALYZE:My Resume.pdf", Instruction::Analyze("My Resume.pdf".into())),
            ("ACTION:ANALYZE:dir/a:b.txt", Instruction::Analyze("dir/a:b.txt".into())),
        ];
        for (output, expected) in cases {
            assert_eq!(Instruction::parse(output), expected, "{output:?}");
        }
    }

    #[test]
    fn everything_else_is_text() {
        for output in [
            "Hello! How can I help?",
            "READ:",
            "ACTION:ANALYZE:   ",
            "list",
            "LISTEN carefully",
            "I will now READ:resume.pdf",
        ] {
            assert_eq!(
                Instruction::parse(output),
                Instruction::Text(output.trim().to_string()),
                "{output:?}"
            );
        }
    }

    #[test]
    fn sentinel_must_lead_the_first_line() {
        assert_eq!(
            Instruction::parse("Sure.\nACTION:LIST_FILES"),
            Instruction::Text("Sure.\nACTION:LIST_FILES".into())
        );
        assert_eq!(
            Instruction::parse("READ:a.txt\nthen summarize it"),
            Instruction::Read("a.txt".into())
        );
    }

    #[test]
    fn direct_requests() {
        assert_eq!(Instruction::direct("list the files"), Some(Instruction::List));
        assert_eq!(Instruction::direct("  Show Files! "), Some(Instruction::List));
        assert_eq!(
            Instruction::direct("READ:cv.txt"),
            Some(Instruction::Read("cv.txt".into()))
        );
        assert_eq!(Instruction::direct("please list the files"), None);
        assert_eq!(Instruction::direct("hello"), None);
    }

    #[test]
    fn detects_job_descriptions() {
        assert!(is_job_description("Requirements: Rust, Tokio"));
        assert!(is_job_description("We are looking for a backend engineer"));
        assert!(is_job_description("3+ YEARS OF EXPERIENCE with Kubernetes"));
        assert!(!is_job_description("Can you read my resume?"));
    }
}

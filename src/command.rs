//! Parsing of command lines into verb and argument.

/// One SMTP command: an upper-cased verb and its raw argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    argument: Option<String>,
}

impl Command {
    pub fn new(verb: impl Into<String>, argument: Option<String>) -> Self {
        Self {
            verb: verb.into().to_ascii_uppercase(),
            argument,
        }
    }

    /// Split a delimiter-stripped line at the first space.
    ///
    /// An argument made only of whitespace counts as no argument.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (verb, argument) = match line.split_once(' ') {
            Some((verb, rest)) => {
                let rest = rest.trim();
                (verb, (!rest.is_empty()).then(|| rest.to_string()))
            }
            None => (line, None),
        };
        Self::new(verb, argument)
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

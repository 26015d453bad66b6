//! Parser for the gnomic genotype notation.
//!
//! Genotype cells describe strains as whitespace- or comma-separated
//! changes:
//!
//! * `+geneA` or `geneA` inserts a feature, `-geneA` deletes one.
//! * `site>geneA` replaces the feature at a site.
//! * `(pPlasmid geneA geneB)` declares an episomal plasmid with its
//!   contents; `-(pPlasmid)` marks its loss.
//! * Features may carry an organism prefix (`Eco/geneA`), a variant
//!   (`geneA(cold-resistant)`), and a database accession (`geneA#BBa:B0034`
//!   or a bare `#BBa:B0034`).
//! * A change may carry a selection marker suffix: `+geneA::kanR`.
//!
//! Uploads only need to know a genotype is well-formed, so the parsed tree
//! stays minimal.

use std::fmt;

/// A named genetic feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    /// Organism prefix, if any.
    pub organism: Option<String>,
    /// Feature name; empty for accession-only features.
    pub name: String,
    /// Variant annotation, if any.
    pub variant: Option<String>,
    /// Database accession as `(db, id)`, if any.
    pub accession: Option<(String, String)>,
}

/// A plasmid with its declared contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plasmid {
    pub name: String,
    pub contents: Vec<Feature>,
}

/// One genotype change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Insertion { feature: Feature, markers: Vec<Feature> },
    Deletion { feature: Feature, markers: Vec<Feature> },
    Replacement { site: Feature, feature: Feature, markers: Vec<Feature> },
    PlasmidPresence { plasmid: Plasmid, markers: Vec<Feature> },
    PlasmidLoss { plasmid: Plasmid, markers: Vec<Feature> },
}

/// A parsed genotype: the ordered list of changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Genotype {
    pub changes: Vec<Change>,
}

/// Parse failure with the byte offset where parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for GenotypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for GenotypeError {}

/// Parse a genotype string: changes separated by whitespace or commas. An
/// empty or whitespace-only string parses to an empty genotype.
pub fn parse_genotype(input: &str) -> Result<Genotype, GenotypeError> {
    let mut parser = GenotypeParser::new(input);
    let mut changes = Vec::new();
    parser.skip_whitespace();
    while !parser.at_end() {
        changes.push(parser.change()?);
        let before = parser.pos;
        parser.skip_whitespace();
        if parser.eat(',') {
            parser.skip_whitespace();
        } else if !parser.at_end() && parser.pos == before {
            return Err(parser.error("expected separator between changes"));
        }
    }
    Ok(Genotype { changes })
}

struct GenotypeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> GenotypeParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), GenotypeError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
        }
    }

    fn error(&self, message: impl Into<String>) -> GenotypeError {
        GenotypeError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn change(&mut self) -> Result<Change, GenotypeError> {
        let change = if self.eat('-') {
            if self.peek() == Some('(') {
                let plasmid = self.plasmid()?;
                Change::PlasmidLoss {
                    plasmid,
                    markers: Vec::new(),
                }
            } else {
                Change::Deletion {
                    feature: self.feature()?,
                    markers: Vec::new(),
                }
            }
        } else if self.peek() == Some('(') {
            Change::PlasmidPresence {
                plasmid: self.plasmid()?,
                markers: Vec::new(),
            }
        } else {
            let explicit_insertion = self.eat('+');
            let first = self.feature()?;
            if !explicit_insertion && self.eat('>') {
                Change::Replacement {
                    site: first,
                    feature: self.feature()?,
                    markers: Vec::new(),
                }
            } else {
                Change::Insertion {
                    feature: first,
                    markers: Vec::new(),
                }
            }
        };
        self.with_markers(change)
    }

    fn with_markers(&mut self, mut change: Change) -> Result<Change, GenotypeError> {
        let mut markers = Vec::new();
        while self.input[self.pos..].starts_with("::") {
            self.pos += 2;
            markers.push(self.feature()?);
        }
        let slot = match &mut change {
            Change::Insertion { markers, .. }
            | Change::Deletion { markers, .. }
            | Change::Replacement { markers, .. }
            | Change::PlasmidPresence { markers, .. }
            | Change::PlasmidLoss { markers, .. } => markers,
        };
        *slot = markers;
        Ok(change)
    }

    fn plasmid(&mut self) -> Result<Plasmid, GenotypeError> {
        self.expect('(')?;
        self.skip_whitespace();
        let name = self.identifier()?;
        let mut contents = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    break;
                }
                Some(_) => contents.push(self.feature()?),
                None => return Err(self.error("unterminated plasmid")),
            }
        }
        Ok(Plasmid { name, contents })
    }

    fn feature(&mut self) -> Result<Feature, GenotypeError> {
        let mut organism = None;
        let mut name = String::new();
        if self.peek() != Some('#') {
            name = self.identifier()?;
            if self.eat('/') {
                organism = Some(name);
                name = self.identifier()?;
            }
        }
        let variant = if self.eat('(') {
            let start = self.pos;
            while self.peek().is_some_and(|c| c != ')') {
                self.bump();
            }
            let text = self.input[start..self.pos].trim().to_string();
            self.expect(')')?;
            if text.is_empty() {
                return Err(self.error("empty variant"));
            }
            Some(text)
        } else {
            None
        };
        let accession = if self.eat('#') {
            let db = self.identifier()?;
            self.expect(':')?;
            let id = self.identifier()?;
            Some((db, id))
        } else {
            None
        };
        if name.is_empty() && accession.is_none() {
            return Err(self.error("expected feature"));
        }
        Ok(Feature {
            organism,
            name,
            variant,
            accession,
        })
    }

    fn identifier(&mut self) -> Result<String, GenotypeError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected identifier"));
        }
        Ok(self.input[start..self.pos].to_string())
    }
}

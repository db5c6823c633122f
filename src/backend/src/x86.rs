//! Textual model of an x86-64 assembly file. `Display` renders a `.s`
//! file: labels and directives flush left, instructions indented.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Label(String),
    Directive(String),
    Instruction(String),
}

#[derive(Debug, Clone)]
pub struct Program {
    pub lines: Vec<Line>,
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for line in &self.lines {
            match line {
                Line::Label(name) => writeln!(f, "{name}:")?,
                Line::Directive(directive) => writeln!(f, "{directive}")?,
                Line::Instruction(instruction) => writeln!(f, "    {instruction}")?,
            }
        }
        Ok(())
    }
}

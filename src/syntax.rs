//! Python syntax checks backed by tree-sitter.

use std::cell::RefCell;
use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A failure here surfaces as `parse` returning None
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

/// First syntax problem found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// 1-based
    pub line: usize,
    pub message: String,
}

fn parse_python(source: &str) -> Option<Tree> {
    PYTHON_PARSER.with(|p| p.borrow_mut().parse(source, None))
}

fn first_error_node<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error_node(child) {
            return Some(found);
        }
    }
    None
}

/// Statements the grammar still accepts but Python 3 does not.
const PYTHON2_STATEMENTS: &[(&str, &str)] = &[
    ("print_statement", "Python 2 print statement"),
    ("exec_statement", "Python 2 exec statement"),
];

fn find_python2_statement(node: Node<'_>) -> Option<(usize, &'static str)> {
    if let Some((_, label)) = PYTHON2_STATEMENTS.iter().find(|(kind, _)| *kind == node.kind()) {
        return Some((node.start_position().row + 1, label));
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if let Some(found) = find_python2_statement(child) {
            return Some(found);
        }
    }
    None
}

/// Width of leading whitespace, tabs advancing to the next multiple of 8.
fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            '\x0c' => width = 0,
            _ => break,
        }
    }
    width
}

#[derive(Clone, Copy)]
struct OpenString {
    quote: char,
    triple: bool,
}

/// Tracks what a line leaves open for the next one.
#[derive(Default)]
struct LineScanner {
    depth: usize,
    string: Option<OpenString>,
    continued: bool,
}

impl LineScanner {
    /// Whether the next physical line starts a new logical line.
    fn at_logical_start(&self) -> bool {
        self.depth == 0 && self.string.is_none() && !self.continued
    }

    /// Consume one physical line. Returns the last significant character
    /// outside strings and comments, if any.
    fn scan(&mut self, line: &str) -> Option<char> {
        let chars: Vec<char> = line.chars().collect();
        let mut last = None;
        let mut i = 0;
        self.continued = false;
        while i < chars.len() {
            let ch = chars[i];
            if let Some(open) = self.string {
                if ch == '\\' {
                    i += 2;
                    continue;
                }
                if ch == open.quote {
                    if !open.triple {
                        self.string = None;
                    } else if chars.get(i + 1) == Some(&open.quote) && chars.get(i + 2) == Some(&open.quote) {
                        self.string = None;
                        i += 2;
                    }
                }
                i += 1;
                continue;
            }
            match ch {
                '#' => break,
                '"' | '\'' => {
                    let triple = chars.get(i + 1) == Some(&ch) && chars.get(i + 2) == Some(&ch);
                    self.string = Some(OpenString { quote: ch, triple });
                    last = Some(ch);
                    i += if triple { 3 } else { 1 };
                    continue;
                }
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
                '\\' if i + 1 == chars.len() => {
                    self.continued = true;
                    break;
                }
                _ => {}
            }
            if !ch.is_whitespace() {
                last = Some(ch);
            }
            i += 1;
        }
        // single-quoted strings end at the line unless escaped
        if let Some(open) = self.string {
            if !open.triple && !line.ends_with('\\') {
                self.string = None;
            }
        }
        last
    }
}

/// Indentation the way Python's tokenizer checks it: an indent needs a
/// block opener and every dedent must land on an enclosing level.
fn check_indentation(source: &str) -> Result<(), SyntaxError> {
    let mut levels = vec![0usize];
    let mut scanner = LineScanner::default();
    let mut opens_block = false;
    let mut in_logical = false;
    let mut logical_last = None;

    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if scanner.at_logical_start() {
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let error = |message: &str| SyntaxError {
                line: idx + 1,
                message: message.to_string(),
            };
            let width = indent_width(line);
            let current = levels.last().copied().unwrap_or(0);
            if width > current {
                if !opens_block {
                    return Err(error("unexpected indent"));
                }
                levels.push(width);
            } else {
                if opens_block {
                    return Err(error("expected an indented block"));
                }
                while levels.last().is_some_and(|&level| level > width) {
                    levels.pop();
                }
                if levels.last() != Some(&width) {
                    return Err(error("unindent does not match any outer indentation level"));
                }
            }
            in_logical = true;
            logical_last = None;
        }

        if let Some(ch) = scanner.scan(line) {
            logical_last = Some(ch);
        }
        if in_logical && scanner.at_logical_start() {
            opens_block = logical_last == Some(':');
            in_logical = false;
        }
    }

    if opens_block {
        return Err(SyntaxError {
            line: source.lines().count().max(1),
            message: "expected an indented block".to_string(),
        });
    }
    Ok(())
}

/// Parse `source` as Python 3 and report the first error, if any.
pub fn check_python(source: &str) -> Result<(), SyntaxError> {
    let Some(tree) = parse_python(source) else {
        return Err(SyntaxError {
            line: 1,
            message: "source could not be parsed".to_string(),
        });
    };

    let root = tree.root_node();
    if !root.has_error() {
        if let Some((line, label)) = find_python2_statement(root) {
            return Err(SyntaxError {
                line,
                message: label.to_string(),
            });
        }
        return check_indentation(source);
    }

    let node = first_error_node(root).unwrap_or(root);
    let line = node.start_position().row + 1;
    let message = if node.is_missing() {
        format!("missing '{}'", node.kind())
    } else {
        let text = node
            .utf8_text(source.as_bytes())
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default()
            .trim();
        if text.is_empty() {
            "invalid syntax".to_string()
        } else {
            format!("invalid syntax near '{}'", crate::util::truncate(text, 40))
        }
    };

    Err(SyntaxError { line, message })
}

/// Names of module-level functions and classes, decorated ones included.
pub fn top_level_names(source: &str) -> Vec<String> {
    let Some(tree) = parse_python(source) else {
        return Vec::new();
    };

    let root = tree.root_node();
    let mut names = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        let definition = match child.kind() {
            "function_definition" | "class_definition" => Some(child),
            "decorated_definition" => child.child_by_field_name("definition"),
            _ => None,
        };
        let name = definition
            .and_then(|def| def.child_by_field_name("name"))
            .and_then(|name| name.utf8_text(source.as_bytes()).ok());
        if let Some(name) = name {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_python_passes() {
        let src = "import os\n\ndef main():\n    return os.getcwd()\n";
        assert_eq!(check_python(src), Ok(()));
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = check_python("def broken(:\n    pass\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_syntax_error_on_later_line() {
        let src = "x = 1\ny = 2\nif x ==:\n    pass\n";
        let err = check_python(src).unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_print_call_is_python3() {
        assert_eq!(check_python("print(\"done\")\nexec(\"x = 1\")\n"), Ok(()));
    }

    #[test]
    fn test_unexpected_indent() {
        let err = check_python("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "unexpected indent");
    }

    #[test]
    fn test_indentation_ignores_brackets_strings_and_comments() {
        let src = r##"
import os

CONFIG = {
        "key": "value:",
  "other": [1,
            2],
}


def load(path,
         mode="r"):
    """Docstring

  with an odd line inside
"""
    text = "# not a comment: "  # trailing:
    if text:
        return os.path.join(path,
   mode)
    total = 1 +             2
    return total


class Empty: pass
"##;
        assert_eq!(check_python(src), Ok(()));
    }

    #[test]
    fn test_dedent_to_enclosing_level_is_fine() {
        let src = "def f(x):\n    if x:\n        return 1\n    return 2\n\n\nprint(f(1))\n";
        assert_eq!(check_python(src), Ok(()));
    }

    #[test]
    fn test_tab_indentation() {
        assert_eq!(check_python("def f():\n\treturn 1\n"), Ok(()));
    }

    #[test]
    fn test_top_level_names_include_decorated() {
        let src = r#"
import functools

class Service:
    def method(self):
        pass

@functools.cache
def cached():
    return 1

async def fetch():
    pass

def plain():
    def nested():
        pass
"#;
        assert_eq!(
            top_level_names(src),
            vec!["Service", "cached", "fetch", "plain"]
        );
    }
}

use super::{Chunker, Packer};

/// One chunk per top-level `def`/`class` block, each prefixed with the
/// module header (docstring, imports, leading comments). Top-level code
/// outside any block is collected into a trailing chunk. Source without
/// any block is packed line by line up to `max_chars`.
pub struct PythonChunker {
    max_chars: usize,
}

impl PythonChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }
}

fn is_top_level(line: &str) -> bool {
    line.chars().next().is_some_and(|c| !c.is_whitespace())
}

/// Name of the block opened by `line`, e.g. `def load` or `class Store`.
fn block_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("async ").unwrap_or(line);
    let (keyword, rest) = if let Some(rest) = rest.strip_prefix("def ") {
        ("def", rest)
    } else if let Some(rest) = rest.strip_prefix("class ") {
        ("class", rest)
    } else {
        return None;
    };
    let name: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then(|| format!("{keyword} {name}"))
}

/// Closing brackets of a multi-line signature sit at column 0 too.
fn continues_block(line: &str) -> bool {
    line.starts_with([')', ']', '}'])
}

/// Leading docstring, imports, comments and blank lines; returns the header
/// text and the index of the first line after it.
fn module_header(lines: &[&str]) -> (String, usize) {
    let mut end = 0;
    let mut docstring: Option<&str> = None;
    for (index, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if let Some(delimiter) = docstring {
            if stripped.contains(delimiter) {
                docstring = None;
            }
            end = index + 1;
            continue;
        }
        if let Some(delimiter) = ["\"\"\"", "'''"]
            .into_iter()
            .find(|d| stripped.starts_with(d))
        {
            if stripped.matches(delimiter).count() < 2 {
                docstring = Some(delimiter);
            }
            end = index + 1;
            continue;
        }
        let keeps_header = stripped.is_empty()
            || stripped.starts_with('#')
            || stripped.starts_with("import ")
            || stripped.starts_with("from ");
        if !keeps_header {
            break;
        }
        end = index + 1;
    }
    (lines[..end].join("\n").trim().to_string(), end)
}

impl Chunker for PythonChunker {
    fn name(&self) -> &'static str {
        "python"
    }

    fn split(&self, text: &str) -> Vec<String> {
        let lines: Vec<&str> = text.lines().collect();
        let (header, body_start) = module_header(&lines);

        let mut blocks: Vec<Vec<&str>> = Vec::new();
        let mut rest: Vec<&str> = Vec::new();
        let mut current: Option<Vec<&str>> = None;
        // Decorators seen since the last top-level statement.
        let mut decorators: Vec<&str> = Vec::new();

        for &line in &lines[body_start..] {
            if !is_top_level(line) || line.starts_with('#') || continues_block(line) {
                match current.as_mut() {
                    Some(block) => block.push(line),
                    None if decorators.is_empty() => rest.push(line),
                    None => decorators.push(line),
                }
                continue;
            }
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            if line.starts_with('@') {
                decorators.push(line);
            } else if block_name(line).is_some() {
                let mut block = std::mem::take(&mut decorators);
                block.push(line);
                current = Some(block);
            } else {
                rest.append(&mut decorators);
                rest.push(line);
            }
        }
        if let Some(block) = current {
            blocks.push(block);
        }
        rest.append(&mut decorators);

        if blocks.is_empty() {
            let mut packer = Packer::new(self.max_chars);
            for line in &lines {
                if !packer.fits(line) {
                    packer.flush();
                }
                if packer.fits(line) {
                    packer.push(line);
                    packer.push("\n");
                } else {
                    packer.push_oversized(line);
                }
            }
            return packer.finish();
        }

        let with_header = |body: String| {
            if header.is_empty() {
                body
            } else {
                format!("{header}\n\n{body}")
            }
        };
        let mut chunks: Vec<String> = blocks
            .into_iter()
            .map(|block| with_header(block.join("\n").trim_end().to_string()))
            .collect();
        let leftover = rest.join("\n");
        if !leftover.trim().is_empty() {
            chunks.push(with_header(leftover.trim().to_string()));
        }
        chunks
    }

    fn title(&self, piece: &str) -> Option<String> {
        piece
            .lines()
            .filter(|line| is_top_level(line))
            .find_map(block_name)
    }
}

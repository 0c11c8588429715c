use anyhow::bail;

/// A named preset, stored as `(x, y)` offsets from its top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pattern {
    pub name: &'static str,
    pub cells: &'static [(usize, usize)],
}

pub const PATTERNS: &[Pattern] = &[
    Pattern {
        name: "glider",
        cells: &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)],
    },
    Pattern {
        name: "blinker",
        cells: &[(0, 1), (1, 1), (2, 1)],
    },
    Pattern {
        name: "block",
        cells: &[(0, 0), (1, 0), (0, 1), (1, 1)],
    },
    Pattern {
        name: "toad",
        cells: &[(1, 0), (2, 0), (3, 0), (0, 1), (1, 1), (2, 1)],
    },
    Pattern {
        name: "beacon",
        cells: &[(0, 0), (1, 0), (0, 1), (1, 1), (2, 2), (3, 2), (2, 3), (3, 3)],
    },
    Pattern {
        name: "r-pentomino",
        cells: &[(1, 0), (2, 0), (0, 1), (1, 1), (1, 2)],
    },
];

impl Pattern {
    pub fn by_name(name: &str) -> Option<Pattern> {
        PATTERNS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .copied()
    }

    /// Width and height of the pattern's bounding box.
    pub fn extent(&self) -> (usize, usize) {
        self.cells.iter().fold((0, 0), |(w, h), &(x, y)| {
            (w.max(x + 1), h.max(y + 1))
        })
    }
}

/// Parse the plaintext row format: `.` is dead, `#` or `O` is alive, lines
/// starting with `!` are comments.
pub fn parse_rows(text: &str) -> anyhow::Result<Vec<(usize, usize)>> {
    let mut cells = Vec::new();
    let mut y = 0;
    for (line_no, line) in text.lines().enumerate() {
        if line.starts_with('!') {
            continue;
        }
        for (x, c) in line.trim_end().chars().enumerate() {
            match c {
                '#' | 'O' => cells.push((x, y)),
                '.' => {}
                other => bail!(
                    "unexpected character {other:?} at line {}, column {}",
                    line_no + 1,
                    x + 1
                ),
            }
        }
        y += 1;
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(Pattern::by_name("Glider").map(|p| p.name), Some("glider"));
        assert!(Pattern::by_name("gosper").is_none());
    }

    #[test]
    fn extents() {
        assert_eq!(Pattern::by_name("block").unwrap().extent(), (2, 2));
        assert_eq!(Pattern::by_name("beacon").unwrap().extent(), (4, 4));
        assert_eq!(Pattern::by_name("blinker").unwrap().extent(), (3, 2));
    }

    #[test]
    fn parses_rows_and_skips_comments() {
        let cells = parse_rows("!Name: glider\n.#.\n..#\n###\n").unwrap();
        assert_eq!(cells, vec![(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn accepts_o_as_alive() {
        assert_eq!(parse_rows("OO\n").unwrap(), vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = parse_rows("..\n.x\n").unwrap_err();
        assert!(err.to_string().contains("line 2, column 2"), "{err}");
    }
}

use super::{Code, Position};
use once_cell::unsync::OnceCell;

impl<'c> From<&'c str> for Code<'c> {
    fn from(value: &'c str) -> Self {
        Code::new(value)
    }
}

impl<'c> Code<'c> {
    pub fn new(value: &'c str) -> Self {
        Self {
            value,
            line_breaks: OnceCell::new(),
            line_chars: OnceCell::new(),
        }
    }

    pub fn obtain_line_breaks(&self) -> &Vec<usize> {
        self.line_breaks.get_or_init(|| {
            self.value
                .bytes()
                .enumerate()
                .filter_map(|(index, b)| if b == b'\n' { Some(index) } else { None })
                .collect()
        })
    }

    /// Character counts preceding each line start, indexed by 0-based line number.
    fn obtain_line_chars(&self) -> &Vec<usize> {
        self.line_chars.get_or_init(|| {
            let breaks = self.obtain_line_breaks();
            let mut counts = Vec::with_capacity(breaks.len() + 1);
            let mut total = 0;
            let mut line_start = 0;
            counts.push(0);
            for break_point in breaks {
                total += self.value[line_start..*break_point].chars().count() + 1;
                counts.push(total);
                line_start = break_point + 1;
            }
            counts
        })
    }

    /// Obtain the line, column and character offset at a byte pointer of the input.
    /// Columns and offsets count characters, not bytes.
    pub fn obtain_position(&self, pointer: usize) -> Position {
        let line_breaks = self.obtain_line_breaks();
        let index = match line_breaks.binary_search(&pointer) {
            Ok(index) | Err(index) => index,
        };

        let line_start = if index == 0 {
            0
        } else {
            line_breaks[index - 1] + 1
        };
        let column = self.value[line_start..pointer].chars().count() + 1;
        let offset = self.obtain_line_chars()[index] + column - 1;
        Position::new(index + 1, column, offset)
    }

    pub fn slice(&self, start: usize, end: usize) -> &'c str {
        &self.value[start..end]
    }
}

use std::io::{self, Stdout, Write};

use crossterm::style::{self, Attribute, Color, SetAttribute, SetBackgroundColor, SetForegroundColor};
use crossterm::{QueueableCommand, cursor, terminal};

use super::lines::{Line, Tone};

fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Normal => Color::Reset,
        Tone::Dim => Color::DarkGrey,
        Tone::Header => Color::Cyan,
        Tone::Flash => Color::Yellow,
        Tone::Marker => Color::Magenta,
        Tone::Info => Color::Green,
        Tone::Error => Color::Red,
    }
}

/// One frame: fixed header and footer around a scrolled body.
pub struct Frame<'a> {
    pub header: &'a [Line],
    pub body: &'a [Line],
    pub footer: &'a [Line],
    pub scroll: usize,
    pub selected: Option<usize>,
}

/// Raw-mode alternate screen, restored on drop.
pub struct Screen {
    stdout: Stdout,
}

impl Screen {
    pub fn enter() -> io::Result<Self> {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode()?;
        stdout.queue(terminal::EnterAlternateScreen)?;
        stdout.queue(cursor::Hide)?;
        stdout.flush()?;
        Ok(Self { stdout })
    }

    /// `(columns, rows)`, with a sane fallback when the size is unknown.
    pub fn size() -> (usize, usize) {
        match terminal::size() {
            Ok((w, h)) if w > 0 && h > 0 => (usize::from(w), usize::from(h)),
            _ => (80, 24),
        }
    }

    /// Rows left for the body once header and footer are drawn.
    pub fn body_rows(height: usize, header: usize, footer: usize) -> usize {
        height.saturating_sub(header + footer).max(1)
    }

    pub fn draw(&mut self, frame: &Frame<'_>) -> io::Result<()> {
        let (_, height) = Self::size();
        let rows = Self::body_rows(height, frame.header.len(), frame.footer.len());
        self.stdout.queue(cursor::MoveTo(0, 0))?;
        self.stdout
            .queue(terminal::Clear(terminal::ClearType::All))?;

        for line in frame.header {
            self.print(line, false)?;
        }
        let visible = frame.body.iter().enumerate().skip(frame.scroll).take(rows);
        let mut drawn = 0;
        for (i, line) in visible {
            self.print(line, frame.selected == Some(i))?;
            drawn += 1;
        }
        for _ in drawn..rows {
            self.stdout.queue(cursor::MoveToNextLine(1))?;
        }
        for line in frame.footer {
            self.print(line, false)?;
        }
        self.stdout.flush()
    }

    fn print(&mut self, line: &Line, selected: bool) -> io::Result<()> {
        if selected {
            self.stdout
                .queue(SetBackgroundColor(Color::DarkBlue))?;
        }
        if matches!(line.tone, Tone::Header | Tone::Flash) {
            self.stdout.queue(SetAttribute(Attribute::Bold))?;
        }
        self.stdout
            .queue(SetForegroundColor(tone_color(line.tone)))?;
        self.stdout.queue(style::Print(&line.text))?;
        self.stdout.queue(SetAttribute(Attribute::Reset))?;
        self.stdout.queue(style::ResetColor)?;
        self.stdout.queue(cursor::MoveToNextLine(1))?;
        Ok(())
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = self.stdout.queue(cursor::Show);
        let _ = self.stdout.queue(terminal::LeaveAlternateScreen);
        let _ = self.stdout.flush();
        let _ = terminal::disable_raw_mode();
    }
}

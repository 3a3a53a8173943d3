use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::actions::FlowState;
use crate::engine::Event;
use crate::export::ExportFormat;
use crate::feed::FeedSession;
use crate::feed::notify::Level;
use crate::types::Millis;
use crate::ui::lines::{self, HELP, Line, Target, Tone};
use crate::ui::{Frame, Screen};
use crate::util;

/// Longest the loop sleeps before draining engine events again.
const MAX_WAIT_MS: Millis = 100;

// ---------------------------------------------------------------------------
// Viewport
// ---------------------------------------------------------------------------

/// Selection and scroll offset over the feed body.
///
/// Selection follows its target across re-renders; when live append puts new
/// lines above it, the scroll offset grows by the same amount so the visible
/// rows stay put.
#[derive(Debug, Default, Clone)]
pub struct Viewport {
    pub selected: usize,
    pub scroll: usize,
    target: Option<Target>,
}

impl Viewport {
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Re-anchor after the body was rebuilt.
    pub fn sync(&mut self, body: &[Line]) {
        if let Some(ref target) = self.target
            && let Some(i) = body.iter().position(|l| l.target.as_ref() == Some(target))
        {
            if i > self.selected {
                self.scroll += i - self.selected;
            }
            self.selected = i;
        } else {
            self.selected = self.selected.min(body.len().saturating_sub(1));
            self.target = body.get(self.selected).and_then(|l| l.target.clone());
        }
        if self.target.is_none() {
            self.step(body, 1);
        }
    }

    /// Move to the next selectable line in `dir` (±1), repeated `n` times.
    pub fn move_by(&mut self, body: &[Line], dir: isize, n: usize) {
        for _ in 0..n {
            if !self.step(body, dir) {
                break;
            }
        }
    }

    fn step(&mut self, body: &[Line], dir: isize) -> bool {
        let mut i = self.selected;
        loop {
            i = match i.checked_add_signed(dir) {
                Some(next) if next < body.len() => next,
                _ => return false,
            };
            if let Some(ref t) = body[i].target {
                self.selected = i;
                self.target = Some(t.clone());
                return true;
            }
        }
    }

    /// Keep the selection inside `rows` visible lines.
    pub fn follow(&mut self, rows: usize, len: usize) {
        if self.selected < self.scroll {
            self.scroll = self.selected;
        } else if self.selected >= self.scroll + rows {
            self.scroll = self.selected + 1 - rows;
        }
        self.scroll = self.scroll.min(len.saturating_sub(rows));
    }

    pub fn sentinel_visible(&self, body: &[Line], rows: usize) -> bool {
        body.iter()
            .skip(self.scroll)
            .take(rows)
            .any(|l| l.target == Some(Target::Sentinel))
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// The interactive `tail` view.
pub struct App {
    session: FeedSession,
    events: Receiver<Event>,
    viewport: Viewport,
    export_dir: PathBuf,
}

impl App {
    pub fn new(session: FeedSession, events: Receiver<Event>, export_dir: PathBuf) -> Self {
        Self {
            session,
            events,
            viewport: Viewport::default(),
            export_dir,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let mut screen = Screen::enter().context("failed to enter the alternate screen")?;
        let now = util::now_ms();
        self.session.reload(now);
        self.session.fetch_summary();
        tracing::info!("app: tailing guild {}", self.session.guild_id());

        let mut dirty = true;
        loop {
            let now = util::now_ms();
            while let Ok(event) = self.events.try_recv() {
                dirty |= self.session.handle_event(event, now);
            }
            dirty |= self.session.tick(now);
            if dirty {
                dirty = self.draw(&mut screen, now)?;
            }

            let wait = (self.session.next_deadline() - now).clamp(0, MAX_WAIT_MS);
            let wait = Duration::from_millis(u64::try_from(wait).unwrap_or(0));
            if !event::poll(wait)? {
                continue;
            }
            match event::read()? {
                TermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    if self.on_key(key, util::now_ms()) == Flow::Quit {
                        break;
                    }
                    dirty = true;
                }
                TermEvent::Resize(..) => dirty = true,
                _ => {}
            }
        }
        Ok(())
    }

    fn footer(&self, width: usize) -> Vec<Line> {
        let mut footer = lines::toast_lines(&self.session, width);
        match self.session.actions().state() {
            FlowState::PlanReceived { action, plan, .. } => {
                footer.extend(lines::plan_lines(action, plan, width));
            }
            FlowState::DryRunRequested { action, .. } | FlowState::Confirmed { action, .. } => {
                footer.push(Line {
                    text: lines::truncate(&format!("working: {}…", action.label()), width),
                    tone: Tone::Dim,
                    target: None,
                });
            }
            FlowState::Idle => {}
        }
        footer.push(Line {
            text: lines::truncate(HELP, width),
            tone: Tone::Dim,
            target: None,
        });
        footer
    }

    /// Paint one frame. Returns whether another frame is needed right away.
    fn draw(&mut self, screen: &mut Screen, now: Millis) -> Result<bool> {
        let (width, height) = Screen::size();
        let header = [lines::status_line(&self.session, width)];
        let footer = self.footer(width);
        let rows = Screen::body_rows(height, header.len(), footer.len());

        let body = lines::feed_lines(self.session.view(), now, width);
        self.viewport.sync(&body);
        self.viewport.follow(rows, body.len());
        screen.draw(&Frame {
            header: &header,
            body: &body,
            footer: &footer,
            scroll: self.viewport.scroll,
            selected: Some(self.viewport.selected),
        })?;
        // Lazy continuation: materialize the next chunk once its sentinel shows.
        Ok(self.viewport.sentinel_visible(&body, rows) && self.session.on_sentinel_visible(now))
    }

    fn selected_key(&self) -> Option<String> {
        match self.viewport.target()? {
            Target::Card(id) => self
                .session
                .view()
                .card(id)
                .map(|c| c.event.group_key().to_owned()),
            Target::Group(key) => Some(key.clone()),
            Target::Sentinel => None,
        }
    }

    /// Shift the selected pin one place in the custom order.
    fn move_selected_pin(&mut self, up: bool, now: Millis) {
        let Some(key) = self.selected_key() else {
            return;
        };
        let Some(at) = self.session.filter().pin_order.iter().position(|k| *k == key) else {
            return;
        };
        let to = if up { at.saturating_sub(1) } else { at + 1 };
        self.session.move_pin(&key, to, now);
    }

    fn export(&mut self, now: Millis) {
        let group = match self.viewport.target() {
            Some(Target::Group(key)) => Some(key.clone()),
            _ => None,
        };
        let format = ExportFormat::Html;
        let Some(result) = self.session.export(format, group.as_deref(), now) else {
            return;
        };
        let name = format!(
            "modfeed-{}-{}.{}",
            self.session.guild_id(),
            now / 1_000,
            format.extension()
        );
        let path = self.export_dir.join(name);
        let written = result
            .map_err(anyhow::Error::from)
            .and_then(|body| std::fs::write(&path, body).map_err(anyhow::Error::from));
        match written {
            Ok(()) => self
                .session
                .notify(Level::Info, format!("Exported {}", path.display()), now),
            Err(e) => self
                .session
                .notify(Level::Error, format!("Export failed: {e}"), now),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn on_key(&mut self, key: KeyEvent, now: Millis) -> Flow {
        let body = lines::feed_lines(self.session.view(), now, Screen::size().0);
        self.viewport.sync(&body);
        let confirming = self.session.actions().pending_plan().is_some();

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Flow::Quit;
            }
            KeyCode::Char('y') if confirming => {
                let _ = self.session.confirm_action(true);
            }
            KeyCode::Char('n') | KeyCode::Esc if confirming => {
                let _ = self.session.confirm_action(false);
            }
            KeyCode::Char('x') => {
                self.session.cancel_action();
            }
            KeyCode::Char('q') | KeyCode::Esc => return Flow::Quit,

            // --- Navigation ---
            KeyCode::Char('j') | KeyCode::Down => self.viewport.move_by(&body, 1, 1),
            KeyCode::Char('k') | KeyCode::Up => self.viewport.move_by(&body, -1, 1),
            KeyCode::PageDown => self.viewport.move_by(&body, 1, 10),
            KeyCode::PageUp => self.viewport.move_by(&body, -1, 10),
            KeyCode::Char(' ') | KeyCode::Enter => match self.viewport.target().cloned() {
                Some(Target::Card(id)) => {
                    self.session.toggle_card(&id);
                }
                Some(Target::Group(key)) => self.session.toggle_group(&key, now),
                Some(Target::Sentinel) => {
                    self.session.on_sentinel_visible(now);
                }
                None => {}
            },

            // --- Filter toggles ---
            KeyCode::Char('g') => self
                .session
                .update_filter(|f| f.group_by_mod = !f.group_by_mod, now),
            KeyCode::Char('v') => self
                .session
                .update_filter(|f| f.group_sort_by_volume = !f.group_sort_by_volume, now),
            KeyCode::Char('o') => self
                .session
                .update_filter(|f| f.order_desc = !f.order_desc, now),
            KeyCode::Char('l') => self
                .session
                .update_filter(|f| f.show_latency = !f.show_latency, now),
            KeyCode::Char('s') => {
                let on = !self.session.filter().stream;
                self.session.set_stream(on, now);
            }
            KeyCode::Char('w') => {
                let next = self.session.recency().next();
                self.session.set_recency_window(next, now);
            }
            KeyCode::Char('d') => {
                let on = !self.session.prefs().prefs().always_dry_run;
                self.session.set_always_dry_run(on, now);
            }

            // --- Refresh ---
            KeyCode::Char('r') => self.session.refresh(now),
            KeyCode::Char('R') => self.session.reload(now),

            // --- Pins ---
            KeyCode::Char('p') => {
                if let Some(key) = self.selected_key() {
                    self.session.toggle_pin(&key, now);
                }
            }
            KeyCode::Char(c @ ('[' | ']')) => self.move_selected_pin(c == '[', now),

            // --- Actions ---
            KeyCode::Char(c @ '1'..='9') => {
                if let Some(Target::Card(id)) = self.viewport.target().cloned() {
                    let index = usize::from(c as u8 - b'1');
                    if let Err(e) = self.session.quick_action(&id, index) {
                        self.session.notify(Level::Error, e.to_string(), now);
                    }
                }
            }
            KeyCode::Char('e') => self.export(now),
            _ => {}
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str) -> Line {
        Line {
            text: id.to_owned(),
            tone: Tone::Normal,
            target: Some(Target::Card(id.to_owned())),
        }
    }

    fn sep() -> Line {
        Line {
            text: "──".to_owned(),
            tone: Tone::Dim,
            target: None,
        }
    }

    #[test]
    fn selection_skips_separators() {
        let body = vec![sep(), card("a"), sep(), card("b")];
        let mut vp = Viewport::default();
        vp.sync(&body);
        assert_eq!(vp.selected, 1);
        vp.move_by(&body, 1, 1);
        assert_eq!(vp.selected, 3);
        assert_eq!(vp.target(), Some(&Target::Card("b".into())));
        // Already at the bottom.
        vp.move_by(&body, 1, 1);
        assert_eq!(vp.selected, 3);
    }

    #[test]
    fn prepended_lines_keep_the_selection_in_place() {
        let mut body = vec![card("a"), card("b")];
        let mut vp = Viewport::default();
        vp.sync(&body);
        vp.move_by(&body, 1, 1);
        assert_eq!(vp.selected, 1);

        body.splice(0..0, [card("new1"), card("new2")]);
        vp.sync(&body);
        assert_eq!(vp.selected, 3);
        assert_eq!(vp.scroll, 2);
        assert_eq!(vp.target(), Some(&Target::Card("b".into())));
    }

    #[test]
    fn follow_scrolls_to_keep_selection_visible() {
        let body: Vec<Line> = (0..20).map(|i| card(&i.to_string())).collect();
        let mut vp = Viewport::default();
        vp.sync(&body);
        vp.move_by(&body, 1, 12);
        vp.follow(5, body.len());
        assert_eq!(vp.selected, 12);
        assert_eq!(vp.scroll, 8);
    }

    #[test]
    fn sentinel_visibility_depends_on_scroll() {
        let mut body: Vec<Line> = (0..10).map(|i| card(&i.to_string())).collect();
        body.push(Line {
            text: "more".into(),
            tone: Tone::Dim,
            target: Some(Target::Sentinel),
        });
        let mut vp = Viewport::default();
        vp.sync(&body);
        assert!(!vp.sentinel_visible(&body, 5));
        vp.scroll = 6;
        assert!(vp.sentinel_visible(&body, 5));
    }
}

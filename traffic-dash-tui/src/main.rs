use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Bar, BarChart, BarGroup, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};
use std::{io, time::Duration};
use tokio::sync::mpsc;
use traffic_dash::{
    format_bytes, present, ChartSpec, ConnectionManager, ConnectionState, DashError,
    Command, HistoryClient, HistoryRange, HistorySeries, Selection, StreamConfig, Theme,
    ThemePreference, TrafficStore, ViewController, ViewState,
};

/// Everything the driver loop owns. Single-writer for the store and the held
/// history result; the render pass only reads.
struct App {
    store: TrafficStore,
    controller: ViewController,
    manager: ConnectionManager,
    history_client: HistoryClient,
    history_tx: mpsc::Sender<(u64, Result<HistorySeries, DashError>)>,
    theme: Theme,
    theme_preference: ThemePreference,
    connection_state: ConnectionState,
    /// Cursor over the selectable clients of the current view
    selected: usize,
    running: bool,
}

impl App {
    /// Clients selectable in the current view, in render order.
    fn selectable_clients(&self) -> Vec<String> {
        match self.controller.view() {
            ViewState::Live => self.store.overview_order(),
            ViewState::History { .. } => self
                .controller
                .history()
                .map(|history| history.clients().cloned().collect())
                .unwrap_or_default(),
            ViewState::Drilldown { .. } => Vec::new(),
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.running = false;
            }
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                let count = self.selectable_clients().len();
                if count > 0 {
                    self.selected = (self.selected + 1).min(count - 1);
                }
            }
            KeyCode::Enter => {
                if let Some(client) = self.selectable_clients().get(self.selected) {
                    self.apply_selection(Selection::Client(client.clone()));
                }
            }
            KeyCode::Char('1') => self.apply_selection(Selection::Range(HistoryRange::M15)),
            KeyCode::Char('2') => self.apply_selection(Selection::Range(HistoryRange::H1)),
            KeyCode::Char('3') => self.apply_selection(Selection::Range(HistoryRange::H6)),
            KeyCode::Char('l') | KeyCode::Char('L') => self.apply_selection(Selection::Live),
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('b') => {
                self.apply_selection(Selection::Back);
            }
            KeyCode::Char('t') | KeyCode::Char('T') => {
                self.theme = self.theme_preference.toggle(self.theme);
            }
            _ => {}
        }
    }

    /// Route a selection through the view controller and execute the
    /// returned commands.
    fn apply_selection(&mut self, selection: Selection) {
        self.selected = 0;
        for command in self.controller.handle(selection) {
            match command {
                Command::CloseStream => self.manager.close(),
                Command::OpenStream => self.manager.open(),
                Command::FetchHistory { range, seq } => {
                    let client = self.history_client.clone();
                    let tx = self.history_tx.clone();
                    tokio::spawn(async move {
                        let result = client.fetch_range(range).await;
                        let _ = tx.send((seq, result)).await;
                    });
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

/// Log to the file named by `TRAFFIC_DASH_LOG` so the alternate screen stays
/// clean; without it, logging is off.
fn init_tracing() {
    if let Ok(path) = std::env::var("TRAFFIC_DASH_LOG") {
        if let Ok(file) = std::fs::File::create(path) {
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .init();
        }
    }
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (manager, mut update_rx, state_rx) = ConnectionManager::new(StreamConfig::from_env());
    let (history_tx, mut history_rx) = mpsc::channel(8);
    let theme_preference = ThemePreference::from_env();
    let theme = theme_preference.load();

    let mut app = App {
        store: TrafficStore::new(),
        controller: ViewController::new(),
        manager,
        history_client: HistoryClient::from_env(),
        history_tx,
        theme,
        theme_preference,
        connection_state: ConnectionState::Idle,
        selected: 0,
        running: true,
    };

    app.manager.open();

    let tick_rate = Duration::from_millis(100);

    while app.running {
        // Apply everything that arrived since the last frame, in order.
        while let Ok(update) = update_rx.try_recv() {
            app.store.update(update.snapshot, update.metadata);
        }
        while let Ok((seq, result)) = history_rx.try_recv() {
            app.controller.apply_history(seq, result);
        }
        app.connection_state = *state_rx.borrow();

        terminal.draw(|f| ui(f, &app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key.code);
            }
        }
    }

    Ok(())
}

fn to_color(rgb: present::Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(f.area());

    render_status_bar(f, chunks[0], app);

    let spec = present::render(
        app.controller.view(),
        &app.store,
        app.controller.history(),
        app.theme,
    );
    match spec {
        ChartSpec::Bars(bars) => render_bars(f, chunks[1], app, &bars),
        ChartSpec::Lines(lines) => render_lines(f, chunks[1], &lines),
    }

    render_help(f, chunks[2], app);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let style = present::ChartStyle::for_theme(app.theme);

    let (symbol, color) = match app.connection_state {
        ConnectionState::Connected => ("●", Color::Rgb(0, 255, 127)),
        ConnectionState::Connecting | ConnectionState::Disconnected => {
            ("◌", Color::Rgb(255, 215, 0))
        }
        ConnectionState::Idle | ConnectionState::Closed => ("○", Color::Rgb(128, 128, 150)),
    };

    let mut spans = vec![
        Span::styled(
            format!(" {} {} ", symbol, app.connection_state.label()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            breadcrumb(app),
            Style::default().fg(to_color(style.text)),
        ),
    ];

    let totals = app.store.global_totals();
    spans.push(Span::styled(
        format!(
            " | {} clients, in {}, out {} ",
            totals.clients,
            format_bytes(totals.inbound),
            format_bytes(totals.outbound)
        ),
        Style::default().fg(Color::Rgb(100, 149, 237)),
    ));

    if let Some(updated) = app.store.last_update() {
        spans.push(Span::styled(
            format!(" | updated {} ", updated.format("%H:%M:%S")),
            Style::default().fg(Color::Rgb(128, 128, 150)),
        ));
    }

    if let Some(error) = app.controller.history_error() {
        spans.push(Span::styled(
            format!(" | {error} "),
            Style::default().fg(Color::Rgb(255, 69, 58)),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Traffic Dashboard ")
        .border_style(Style::default().fg(to_color(style.grid)));

    f.render_widget(
        Paragraph::new(Line::from(spans))
            .block(block)
            .alignment(Alignment::Left),
        area,
    );
}

fn breadcrumb(app: &App) -> String {
    match app.controller.view() {
        ViewState::Live => "| Overview (live)".to_string(),
        ViewState::Drilldown { client } => {
            format!("| Detail: {}", app.store.display_label(client))
        }
        ViewState::History { range } => format!("| {}", range.label()),
    }
}

fn render_bars(f: &mut Frame, area: Rect, app: &App, spec: &present::BarSpec) {
    let style = spec.style;

    let mut chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", spec.title))
                .border_style(Style::default().fg(to_color(style.grid)))
                .title_style(Style::default().fg(to_color(style.text))),
        )
        .bar_width(9)
        .bar_gap(1)
        .group_gap(3);

    let selectable = app.selectable_clients();

    for (index, category) in spec.categories.iter().enumerate() {
        let label_style = if !selectable.is_empty() && index == app.selected {
            Style::default()
                .fg(to_color(style.text))
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(to_color(style.text))
        };

        let group = BarGroup::default()
            .label(Line::styled(category.clone(), label_style))
            .bars(&[
                Bar::default()
                    .value(spec.inbound[index])
                    .text_value(format_bytes(spec.inbound[index]))
                    .style(Style::default().fg(to_color(present::INBOUND_COLOR))),
                Bar::default()
                    .value(spec.outbound[index])
                    .text_value(format_bytes(spec.outbound[index]))
                    .style(Style::default().fg(to_color(present::OUTBOUND_COLOR))),
            ]);
        chart = chart.data(group);
    }

    f.render_widget(chart, area);
}

fn render_lines(f: &mut Frame, area: Rect, spec: &present::LineSpec) {
    let style = spec.style;

    // Chart datasets borrow their point slices, so materialise them first.
    let series_points: Vec<Vec<(f64, f64)>> = spec
        .series
        .iter()
        .map(|series| {
            series
                .points
                .iter()
                .map(|(time, total)| (time.timestamp() as f64, *total as f64))
                .collect()
        })
        .collect();

    let datasets: Vec<Dataset> = spec
        .series
        .iter()
        .zip(&series_points)
        .map(|(series, points)| {
            Dataset::default()
                .name(series.label.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(to_color(series.color)))
                .data(points)
        })
        .collect();

    let (x_min, x_max) = bounds(series_points.iter().flatten().map(|point| point.0));
    let (_, y_max) = bounds(series_points.iter().flatten().map(|point| point.1));

    let x_labels = vec![
        format_instant(x_min),
        format_instant((x_min + x_max) / 2.0),
        format_instant(x_max),
    ];
    let y_labels = vec![
        "0 B".to_string(),
        format_bytes((y_max / 2.0) as u64),
        format_bytes(y_max as u64),
    ];

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", spec.title))
                .border_style(Style::default().fg(to_color(style.grid)))
                .title_style(Style::default().fg(to_color(style.text))),
        )
        .x_axis(
            Axis::default()
                .style(Style::default().fg(to_color(style.grid)))
                .labels(x_labels)
                .bounds([x_min, x_max.max(x_min + 1.0)]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(to_color(style.grid)))
                .labels(y_labels)
                .bounds([0.0, y_max.max(1.0)]),
        );

    f.render_widget(chart, area);
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::MAX, 0.0), |(min, max): (f64, f64), value| {
        (min.min(value), max.max(value))
    });
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

fn format_instant(secs: f64) -> String {
    chrono::DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|time| time.format("%H:%M").to_string())
        .unwrap_or_default()
}

fn render_help(f: &mut Frame, area: Rect, app: &App) {
    let help = match app.controller.view() {
        ViewState::Live => {
            " [Up/Down] select  [Enter] detail  [1/2/3] history 15m/1h/6h  [t] theme  [q] quit "
        }
        ViewState::Drilldown { .. } => {
            " [Esc] back  [l] live  [1/2/3] history 15m/1h/6h  [t] theme  [q] quit "
        }
        ViewState::History { .. } => {
            " [Up/Down] select  [Enter] detail  [1/2/3] range  [l] live  [Esc] back  [q] quit "
        }
    };

    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::Rgb(128, 128, 150))),
        area,
    );
}

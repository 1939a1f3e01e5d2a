use std::sync::Arc;

use tokio::io::AsyncBufRead;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::domain::events::AuthView;
use crate::domain::ports::{AuthGateway, AuthWidget, BookmarkStore, Navigator, Route};
use crate::use_cases::dashboard::{DashboardCommand, DashboardScreen, DashboardView};
use crate::use_cases::entry_screen::{EntryOutcome, EntryScreen};

// Why a screen loop handed control back to the route dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellExit {
    Routed,
    Quit,
}

// Route switch shared between screens and the dispatcher loop.
#[derive(Clone)]
pub struct ShellNavigator {
    tx: Arc<watch::Sender<Route>>,
}

impl ShellNavigator {
    pub fn new() -> (Self, watch::Receiver<Route>) {
        let (tx, rx) = watch::channel(Route::Entry);
        (Self { tx: Arc::new(tx) }, rx)
    }
}

impl Navigator for ShellNavigator {
    fn navigate(&self, route: Route) {
        let _ = self.tx.send(route);
    }
}

pub fn render_entry(loading: bool, confirm_notice: bool, providers: &[String]) -> String {
    if loading {
        return "Loading...".to_string();
    }
    let mut out = String::from("== Smart Bookmark ==\nSign in to manage your private bookmarks\n");
    if confirm_notice {
        out.push_str("Check your email for the confirmation link to verify your account.\n");
    }
    out.push_str("Commands: signin <email> <password> | signup <email> <password>");
    for provider in providers {
        out.push_str(&format!(" | signin-with {provider}"));
    }
    out.push_str(" | quit");
    out
}

pub fn render_dashboard(view: &DashboardView) -> String {
    // The form and list never render without a confirmed user.
    let Some(email) = view.user_email.as_deref() else {
        return "Loading...".to_string();
    };
    let mut out = format!("== My Bookmarks ({email}) ==\n");
    if view.pending_create {
        out.push_str("Adding...\n");
    }
    if view.bookmarks.is_empty() {
        out.push_str("No bookmarks yet. Add one above!");
    } else {
        for (index, bookmark) in view.bookmarks.iter().enumerate() {
            out.push_str(&format!("{}. {} - {}\n", index + 1, bookmark.title, bookmark.url));
        }
        out.pop();
    }
    out
}

// Entry screen loop: probe the session, then hand every credential command
// to the widget and mirror its events back into the screen state.
pub async fn run_entry<A, W, N, R>(
    auth: A,
    widget: W,
    navigator: N,
    input: &mut tokio::io::Lines<R>,
) -> ShellExit
where
    A: AuthGateway,
    W: AuthWidget,
    N: Navigator,
    R: AsyncBufRead + Unpin,
{
    let mut screen = EntryScreen::new(auth, navigator);
    let mut widget_events = widget.events();

    if screen.resolve().await == EntryOutcome::RedirectToDashboard {
        return ShellExit::Routed;
    }
    println!(
        "{}",
        render_entry(screen.is_loading(), screen.shows_confirm_notice(), &widget.providers())
    );

    loop {
        tokio::select! {
            event = widget_events.recv() => {
                match event {
                    Ok(event) => {
                        screen.on_widget_event(event);
                        println!(
                            "{}",
                            render_entry(
                                screen.is_loading(),
                                screen.shows_confirm_notice(),
                                &widget.providers(),
                            )
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return ShellExit::Quit,
                }
            }
            line = input.next_line() => {
                let Ok(Some(line)) = line else {
                    return ShellExit::Quit;
                };
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some("signin"), Some(email), Some(password)) => {
                        widget.set_view(AuthView::SignIn);
                        match widget.sign_in(email, password).await {
                            Ok(_) => {
                                screen.navigator.navigate(Route::Dashboard);
                                return ShellExit::Routed;
                            }
                            Err(err) => println!("{}", err.message()),
                        }
                    }
                    (Some("signup"), Some(email), Some(password)) => {
                        widget.set_view(AuthView::SignUp);
                        if let Err(err) = widget.sign_up(email, password).await {
                            println!("{}", err.message());
                        }
                        // A sign-up with an unconfirmed email stays on this
                        // screen; the widget event raises the notice.
                    }
                    (Some("quit"), ..) => return ShellExit::Quit,
                    _ => println!("unknown command"),
                }
            }
        }
    }
}

// Dashboard loop: the screen task owns the subscriptions; this loop only
// translates lines into commands and re-renders published views.
pub async fn run_dashboard<A, S, N, R>(
    auth: A,
    store: S,
    navigator: N,
    input: &mut tokio::io::Lines<R>,
) -> ShellExit
where
    A: AuthGateway + Send + 'static,
    S: BookmarkStore + Send + 'static,
    N: Navigator + Send + 'static,
    R: AsyncBufRead + Unpin,
{
    let screen = DashboardScreen::new(auth, store, navigator);
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (view_tx, mut view_rx) = watch::channel(DashboardView::default());
    let screen_task = tokio::spawn(screen.run(command_rx, view_tx));
    let mut last_view = DashboardView::default();

    let exit = loop {
        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    // The screen task ended: signed out or failed to mount.
                    break ShellExit::Routed;
                }
                last_view = view_rx.borrow_and_update().clone();
                println!("{}", render_dashboard(&last_view));
            }
            line = input.next_line() => {
                let Ok(Some(line)) = line else {
                    break ShellExit::Quit;
                };
                let mut parts = line.split_whitespace();
                match parts.next() {
                    Some("add") => {
                        let url = parts.next().unwrap_or_default().to_string();
                        let title = parts.collect::<Vec<_>>().join(" ");
                        let _ = command_tx.send(DashboardCommand::SetTitle(title));
                        let _ = command_tx.send(DashboardCommand::SetUrl(url));
                        let _ = command_tx.send(DashboardCommand::Submit);
                    }
                    Some("rm") => {
                        match parse_delete_target(parts.next(), &last_view) {
                            Some(id) => {
                                let _ = command_tx.send(DashboardCommand::Delete(id));
                            }
                            None => println!("usage: rm <list number or bookmark id>"),
                        }
                    }
                    Some("ls") => println!("{}", render_dashboard(&last_view)),
                    Some("signout") => {
                        let _ = command_tx.send(DashboardCommand::SignOut);
                    }
                    Some("quit") => break ShellExit::Quit,
                    _ => println!("commands: add <url> <title> | rm <n> | ls | signout | quit"),
                }
            }
        }
    };

    drop(command_tx);
    let _ = screen_task.await;
    exit
}

// `rm` accepts a 1-based list position or a raw row id.
fn parse_delete_target(arg: Option<&str>, view: &DashboardView) -> Option<Uuid> {
    let arg = arg?;
    if let Ok(position) = arg.parse::<usize>() {
        return view
            .bookmarks
            .get(position.checked_sub(1)?)
            .map(|bookmark| bookmark.id);
    }
    arg.parse::<Uuid>().ok()
}

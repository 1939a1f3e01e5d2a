// Shared fixtures for screen-flow integration tests: an in-memory backend
// plus helpers that open dashboard "tabs" the way the shell wires them.
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use smart_bookmark::domain::entities::Session;
use smart_bookmark::domain::ports::{AuthWidget, Route};
use smart_bookmark::interface_adapters::memory::{MemoryAuthWidget, MemoryBackend};
use smart_bookmark::interface_adapters::shell::ShellNavigator;
use smart_bookmark::use_cases::dashboard::{DashboardCommand, DashboardScreen, DashboardView};

pub const WAIT: Duration = Duration::from_secs(2);

// One running dashboard instance with its command, view, and route handles.
pub struct Tab {
    pub commands: mpsc::UnboundedSender<DashboardCommand>,
    pub views: watch::Receiver<DashboardView>,
    pub routes: watch::Receiver<Route>,
    pub task: tokio::task::JoinHandle<()>,
}

pub fn widget_for(backend: &MemoryBackend) -> MemoryAuthWidget {
    MemoryAuthWidget::new(backend.clone(), vec!["google".to_string()])
}

pub async fn sign_up(backend: &MemoryBackend, email: &str) -> Session {
    widget_for(backend)
        .sign_up(email, "hunter2")
        .await
        .expect("expected sign up to succeed")
}

pub fn open_tab(backend: &MemoryBackend) -> Tab {
    let (navigator, routes) = ShellNavigator::new();
    let screen = DashboardScreen::new(backend.clone(), backend.clone(), navigator);
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (view_tx, views) = watch::channel(DashboardView::default());
    let task = tokio::spawn(screen.run(command_rx, view_tx));
    Tab {
        commands,
        views,
        routes,
        task,
    }
}

pub fn add_bookmark(tab: &Tab, title: &str, url: &str) {
    tab.commands
        .send(DashboardCommand::SetTitle(title.to_string()))
        .expect("expected command channel to be open");
    tab.commands
        .send(DashboardCommand::SetUrl(url.to_string()))
        .expect("expected command channel to be open");
    tab.commands
        .send(DashboardCommand::Submit)
        .expect("expected command channel to be open");
}

// Waits until the tab publishes a view matching the predicate. Also checks
// the final view if the screen task ends first.
pub async fn wait_for_view<F>(tab: &mut Tab, mut predicate: F) -> DashboardView
where
    F: FnMut(&DashboardView) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            {
                let view = tab.views.borrow_and_update().clone();
                if predicate(&view) {
                    return view;
                }
            }
            if tab.views.changed().await.is_err() {
                let view = tab.views.borrow().clone();
                if predicate(&view) {
                    return view;
                }
                panic!("screen ended before reaching the expected state");
            }
        }
    })
    .await
    .expect("timed out waiting for the expected view")
}

// Waits for the next navigation the screen performs and returns its target.
pub async fn wait_for_navigation(tab: &mut Tab) -> Route {
    tokio::time::timeout(WAIT, async {
        tab.routes
            .changed()
            .await
            .expect("route channel closed without a navigation");
        *tab.routes.borrow_and_update()
    })
    .await
    .expect("timed out waiting for a navigation")
}

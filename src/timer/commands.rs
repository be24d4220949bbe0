use crate::{
    timer::{RetrySummary, SessionController, SessionSnapshot, SessionTotals},
    AppState,
};

fn controller_from_state(state: &AppState) -> SessionController {
    state.timer.clone()
}

pub async fn get_session_state(state: &AppState) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(state);
    Ok(controller.snapshot().await)
}

/// Start a session. `target_cycles` falls back to the configured default and
/// is clamped to at least one cycle.
pub async fn start_study(
    state: &AppState,
    target_cycles: Option<u32>,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(state);
    let target = target_cycles
        .unwrap_or_else(|| state.settings.get().default_target_cycles)
        .max(1);
    controller.start(target).await.map_err(|e| e.to_string())
}

pub async fn stop_study(state: &AppState) -> Result<Option<SessionTotals>, String> {
    let controller = controller_from_state(state);
    Ok(controller.stop().await)
}

pub async fn retry_pending_reports(state: &AppState) -> Result<RetrySummary, String> {
    let controller = controller_from_state(state);
    controller
        .retry_pending_reports()
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::report::testing::MemorySink;
    use crate::scratch::MemoryScratch;
    use crate::sensing::SimulatedDetector;
    use crate::settings::{SettingsStore, UserSettings};
    use crate::timer::{ControllerConfig, SessionPhase};

    fn app_state(dir: &TempDir, settings: UserSettings) -> AppState {
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        store.update(settings).unwrap();
        let timer = SessionController::new(
            ControllerConfig::default(),
            Arc::new(SimulatedDetector::with_seed(7)),
            Arc::new(MemorySink::default()),
            Arc::new(MemoryScratch::new()),
        );
        AppState::new(timer, Arc::new(store))
    }

    #[tokio::test(start_paused = true)]
    async fn start_uses_configured_default_cycles() {
        let dir = TempDir::new().unwrap();
        let state = app_state(
            &dir,
            UserSettings {
                default_target_cycles: 3,
                ..UserSettings::default()
            },
        );

        let snapshot = start_study(&state, None).await.unwrap();
        assert_eq!(snapshot.target_cycles, 3);
        assert_eq!(snapshot.phase, SessionPhase::Focus);
        assert_eq!(snapshot.countdown, "25:00");

        stop_study(&state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_cycles_are_clamped_and_double_start_errors() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir, UserSettings::default());

        let snapshot = start_study(&state, Some(0)).await.unwrap();
        assert_eq!(snapshot.target_cycles, 1);

        let err = start_study(&state, Some(2)).await.unwrap_err();
        assert!(err.contains("already active"));

        let totals = stop_study(&state).await.unwrap().unwrap();
        assert_eq!(totals.target_cycles, 1);
        assert!(stop_study(&state).await.unwrap().is_none());

        let snapshot = get_session_state(&state).await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Stopped);
    }

    #[tokio::test]
    async fn retry_with_nothing_pending() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir, UserSettings::default());
        let summary = retry_pending_reports(&state).await.unwrap();
        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.remaining, 0);
    }
}

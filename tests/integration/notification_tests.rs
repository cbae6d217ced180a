use super::*;
use visa_watcher::checker::AppointmentSlot;
use visa_watcher::notify::NotificationFanout;

#[tokio::test]
async fn test_unconfigured_setup_still_delivers_via_log() {
    // No Telegram or email credentials: only the log channel is live.
    let config = test_config();
    let fanout = NotificationFanout::from_config(&config);

    let slots = vec![
        AppointmentSlot {
            date: "14".to_string(),
            classes: String::new(),
            parent_classes: String::new(),
        },
        AppointmentSlot {
            date: "21".to_string(),
            classes: String::new(),
            parent_classes: String::new(),
        },
    ];
    let delivered = fanout.notify_appointments_found(&slots).await;
    assert!(delivered);
}

#[tokio::test]
async fn test_per_channel_outcomes_cover_every_channel() {
    let config = test_config();
    let fanout = NotificationFanout::from_config(&config);

    let results = fanout.notify("message", &[]).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results.get("log"), Some(&true));
    // Credential-gated channels are present but recorded as not delivered.
    assert_eq!(results.get("telegram"), Some(&false));
    assert_eq!(results.get("email"), Some(&false));
}

#[tokio::test]
async fn test_error_notification_reports_delivery() {
    let config = test_config();
    let fanout = NotificationFanout::from_config(&config);

    let delivered = fanout.notify_error("check cycle died unexpectedly").await;
    assert!(delivered);
}

mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use coachline_booking::{ContactChange, ModificationEngine, PassengerChange, SeatChange};
use coachline_core::models::{BookingStatus, ModificationType};
use coachline_core::{BookingError, BookingQuery, BookingStore, PermissionPolicy};
use coachline_shared::Masked;
use common::{request, Fixture};
use uuid::Uuid;

fn engine(fx: &Fixture) -> ModificationEngine {
    ModificationEngine::new(fx.manager.clone(), PermissionPolicy::default())
}

#[tokio::test]
async fn test_passenger_details_change() {
    let fx = Fixture::new().await;
    let owner = Uuid::new_v4();
    let booking = fx
        .manager
        .create_booking(request(Some(owner), fx.trip.id, &["1A", "1B"]))
        .await
        .unwrap();
    let passengers = fx.store.list_passengers(booking.id).await.unwrap();

    let result = engine(&fx)
        .modify_passenger_info(
            booking.id,
            vec![PassengerChange {
                passenger_id: passengers[0].id,
                full_name: Some("  Nguyen Van An ".to_string()),
                document_id: Some("B1234567".to_string()),
            }],
            Some(owner),
        )
        .await
        .expect("Modification failed");

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.price_delta, 0);
    assert!(result.records.iter().all(|r| r.modification_type == ModificationType::PassengerInfo));

    let stored = fx.store.list_passengers(booking.id).await.unwrap();
    assert_eq!(stored[0].full_name, "Nguyen Van An");
    assert_eq!(stored[0].document_id.as_deref(), Some("B1234567"));
    assert_eq!(stored[1], passengers[1]);

    assert_eq!(fx.store.list_modifications(booking.id).await.unwrap().len(), 2);
    let audit = fx.store.list_audit_entries(booking.id).await.unwrap();
    let modified = audit.iter().find(|e| e.action == "booking.modified").expect("No audit entry");
    assert_eq!(modified.actor_id, Some(owner));
}

#[tokio::test]
async fn test_unchanged_values_write_nothing() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A"]))
        .await
        .unwrap();
    let passenger = fx.store.list_passengers(booking.id).await.unwrap().remove(0);

    let result = engine(&fx)
        .modify_passenger_info(
            booking.id,
            vec![PassengerChange {
                passenger_id: passenger.id,
                full_name: Some(passenger.full_name.clone()),
                ..PassengerChange::default()
            }],
            None,
        )
        .await
        .unwrap();
    assert!(result.is_noop());

    let result = engine(&fx)
        .change_seats(
            booking.id,
            vec![SeatChange {
                passenger_id: passenger.id,
                new_seat_code: "A1".to_string(),
            }],
            None,
        )
        .await
        .unwrap();
    assert!(result.is_noop());

    assert!(fx.store.list_modifications(booking.id).await.unwrap().is_empty());
    let stored = fx.store.find_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.last_modified_at, booking.last_modified_at);
}

#[tokio::test]
async fn test_unknown_passenger_and_empty_name() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A"]))
        .await
        .unwrap();
    let passenger = fx.store.list_passengers(booking.id).await.unwrap().remove(0);

    let err = engine(&fx)
        .modify_passenger_info(
            booking.id,
            vec![PassengerChange {
                passenger_id: Uuid::new_v4(),
                full_name: Some("Someone".to_string()),
                ..PassengerChange::default()
            }],
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::NotFound { entity: "Passenger", .. });

    let err = engine(&fx)
        .modify_passenger_info(
            booking.id,
            vec![PassengerChange {
                passenger_id: passenger.id,
                full_name: Some("   ".to_string()),
                ..PassengerChange::default()
            }],
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::Validation(_));
}

#[tokio::test]
async fn test_seat_upgrade_moves_ledger_and_price() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A"]))
        .await
        .unwrap();
    let passenger = fx.store.list_passengers(booking.id).await.unwrap().remove(0);

    let result = engine(&fx)
        .change_seats(
            booking.id,
            vec![SeatChange {
                passenger_id: passenger.id,
                new_seat_code: "2a".to_string(),
            }],
            None,
        )
        .await
        .expect("Seat change failed");

    assert_eq!(result.price_delta, 50_000);
    assert_eq!(result.booking.total_amount, 150_000);
    assert_eq!(result.records[0].modification_type, ModificationType::SeatChange);

    assert!(fx.store.seat_row(fx.trip.id, fx.seat("1A").id).await.unwrap().is_free());
    let taken = fx.store.seat_row(fx.trip.id, fx.seat("2A").id).await.unwrap();
    assert_eq!(taken.booking_id, Some(booking.id));
    assert_eq!(taken.lock_expires_at, booking.expires_at);

    let stored = fx.store.list_passengers(booking.id).await.unwrap();
    assert_eq!(stored[0].seat_code, "2A");

    // Downgrade refunds the difference
    let result = engine(&fx)
        .change_seats(
            booking.id,
            vec![SeatChange {
                passenger_id: passenger.id,
                new_seat_code: "1B".to_string(),
            }],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.price_delta, -50_000);
    assert_eq!(result.booking.total_amount, 100_000);
}

#[tokio::test]
async fn test_passengers_can_swap_seats() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A", "2B"]))
        .await
        .unwrap();
    let passengers = fx.store.list_passengers(booking.id).await.unwrap();

    let result = engine(&fx)
        .change_seats(
            booking.id,
            vec![
                SeatChange {
                    passenger_id: passengers[0].id,
                    new_seat_code: "2B".to_string(),
                },
                SeatChange {
                    passenger_id: passengers[1].id,
                    new_seat_code: "1A".to_string(),
                },
            ],
            None,
        )
        .await
        .expect("Swap failed");

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.price_delta, 0);
    assert_eq!(result.booking.total_amount, booking.total_amount);

    for code in ["1A", "2B"] {
        let row = fx.store.seat_row(fx.trip.id, fx.seat(code).id).await.unwrap();
        assert_eq!(row.booking_id, Some(booking.id));
    }
    let stored = fx.store.list_passengers(booking.id).await.unwrap();
    assert_eq!(stored[0].seat_code, "2B");
    assert_eq!(stored[1].seat_code, "1A");
}

#[tokio::test]
async fn test_two_passengers_on_one_seat_is_rejected() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A", "1B"]))
        .await
        .unwrap();
    let passengers = fx.store.list_passengers(booking.id).await.unwrap();

    let err = engine(&fx)
        .change_seats(
            booking.id,
            vec![SeatChange {
                passenger_id: passengers[0].id,
                new_seat_code: "1B".to_string(),
            }],
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::Conflict(_));

    let stored = fx.store.list_passengers(booking.id).await.unwrap();
    assert_eq!(stored, passengers);
}

#[tokio::test]
async fn test_taken_seat_rolls_back_whole_change() {
    let fx = Fixture::new().await;
    let mine = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A", "1B"]))
        .await
        .unwrap();
    let theirs = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["2B"]))
        .await
        .unwrap();
    let passengers = fx.store.list_passengers(mine.id).await.unwrap();

    let err = engine(&fx)
        .change_seats(
            mine.id,
            vec![
                SeatChange {
                    passenger_id: passengers[0].id,
                    new_seat_code: "2A".to_string(),
                },
                SeatChange {
                    passenger_id: passengers[1].id,
                    new_seat_code: "2B".to_string(),
                },
            ],
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::SeatsUnavailable { ref seat_codes } if seat_codes == &vec!["2B".to_string()]);

    // First change did not survive either
    let row = fx.store.seat_row(fx.trip.id, fx.seat("2A").id).await;
    assert!(row.map_or(true, |r| r.is_free()));
    let row = fx.store.seat_row(fx.trip.id, fx.seat("1A").id).await.unwrap();
    assert_eq!(row.booking_id, Some(mine.id));
    let row = fx.store.seat_row(fx.trip.id, fx.seat("2B").id).await.unwrap();
    assert_eq!(row.booking_id, Some(theirs.id));
    assert_eq!(fx.store.list_passengers(mine.id).await.unwrap(), passengers);

    let err = engine(&fx)
        .change_seats(
            mine.id,
            vec![SeatChange {
                passenger_id: passengers[0].id,
                new_seat_code: "7C".to_string(),
            }],
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::NotFound { entity: "Seat", .. });
}

#[tokio::test]
async fn test_window_closes_before_departure() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A"]))
        .await
        .unwrap();
    fx.manager.confirm_payment(booking.id).await.unwrap();

    let perms = engine(&fx).check_permissions(booking.id).await.unwrap();
    assert!(perms.can_modify_passengers && perms.can_modify_seats && perms.can_modify_contact);

    fx.clock.set(fx.trip.departure_at - Duration::hours(12));
    let perms = engine(&fx).check_permissions(booking.id).await.unwrap();
    assert!(!perms.any());

    let err = engine(&fx)
        .modify_contact_info(
            booking.id,
            ContactChange {
                email: Some(Masked::new("late@example.com".to_string())),
                ..ContactChange::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::PolicyViolation { ref reason, .. } if reason.contains("24 hours"));
}

#[tokio::test]
async fn test_cancelled_booking_is_frozen() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A"]))
        .await
        .unwrap();
    let passenger = fx.store.list_passengers(booking.id).await.unwrap().remove(0);
    fx.manager.cancel_booking(booking.id, None).await.unwrap();

    let err = engine(&fx)
        .change_seats(
            booking.id,
            vec![SeatChange {
                passenger_id: passenger.id,
                new_seat_code: "1B".to_string(),
            }],
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::PolicyViolation { status: BookingStatus::Cancelled, .. });
    assert!(fx.store.seat_row(fx.trip.id, fx.seat("1B").id).await.is_none());
}

#[tokio::test]
async fn test_overdue_hold_is_expired_not_modified() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A"]))
        .await
        .unwrap();
    fx.clock.advance(Duration::minutes(16));

    let err = engine(&fx)
        .modify_contact_info(
            booking.id,
            ContactChange {
                phone: Some(Masked::new("+84900000000".to_string())),
                ..ContactChange::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::HoldExpired { .. });

    let stored = fx.store.find_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Expired);
    assert_eq!(stored.contact_phone, None);
}

#[tokio::test]
async fn test_contact_details_change() {
    let fx = Fixture::new().await;
    let booking = fx
        .manager
        .create_booking(request(Some(Uuid::new_v4()), fx.trip.id, &["1A"]))
        .await
        .unwrap();

    let err = engine(&fx)
        .modify_contact_info(
            booking.id,
            ContactChange {
                email: Some(Masked::new("not-an-email".to_string())),
                ..ContactChange::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, BookingError::Validation(_));

    let result = engine(&fx)
        .modify_contact_info(
            booking.id,
            ContactChange {
                email: Some(Masked::new("an@example.com".to_string())),
                phone: Some(Masked::new("+84901112222".to_string())),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.records.len(), 2);
    assert!(result.records.iter().all(|r| r.modification_type == ModificationType::ContactInfo));

    let stored = fx.store.find_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.contact_email.as_deref(), Some("an@example.com"));
    assert_eq!(stored.contact_phone.as_deref(), Some("+84901112222"));
}

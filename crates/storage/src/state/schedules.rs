// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Schedule table apply handlers.

use super::StoreState;
use crate::event::StoreEvent;

pub(crate) fn apply(state: &mut StoreState, event: &StoreEvent) {
    match event {
        StoreEvent::ScheduleUpserted { schedule } => {
            state.schedules.insert(schedule.id.clone(), schedule.clone());
        }

        StoreEvent::ScheduleFired { schedule_id, fired_at_ms, next_fire_at_ms } => {
            if let Some(schedule) = state.schedules.get_mut(schedule_id) {
                // Monotonicity: never move next_fire_at backwards on replay.
                if *next_fire_at_ms > schedule.next_fire_at_ms {
                    schedule.last_fired_at_ms = Some(*fired_at_ms);
                    schedule.next_fire_at_ms = *next_fire_at_ms;
                }
            }
        }

        StoreEvent::ScheduleEnabledSet { schedule_id, enabled } => {
            if let Some(schedule) = state.schedules.get_mut(schedule_id) {
                schedule.enabled = *enabled;
            }
        }

        StoreEvent::ScheduleDeleted { schedule_id } => {
            state.schedules.shift_remove(schedule_id);
        }

        _ => {}
    }
}

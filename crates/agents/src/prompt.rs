//! Rendering the loaded context into prompt sections.

use std::fmt::Write;

use stride_common::message::recent_turns;
use stride_common::{AgentContext, ChatTurn, HealthSample, Workout, WorkoutStatus};
const HISTORY_TURNS: usize = 6;

/// Shared system-prompt tail: date, plan position, today's session, recent
/// recovery, active injuries and the whiteboard digest.
pub fn context_section(ctx: &AgentContext) -> String {
    let snap = &ctx.snapshot;
    let mut out = String::from("# Athlete context\n\n");
    let _ = writeln!(out, "Today is {} ({}).", ctx.date.format("%A %Y-%m-%d"), ctx.timezone);

    match &snap.plan {
        Some(status) => {
            let _ = write!(
                out,
                "Plan: {} (week {} of {}",
                status.plan.name, status.current_week, status.total_weeks
            );
            if let Some(phase) = &status.phase {
                let _ = write!(out, ", {phase} phase");
            }
            out.push_str(")\n");
            if let Some(goal) = &status.plan.goal {
                let _ = writeln!(out, "Goal: {goal}");
            }
        }
        None => out.push_str("Plan: none active\n"),
    }

    out.push_str("\n## Today\n");
    if snap.today.is_empty() {
        out.push_str("- Rest day / nothing scheduled\n");
    }
    for workout in &snap.today {
        let _ = writeln!(out, "- {}", describe_workout(workout));
    }

    if let Some(health) = snap.latest_health() {
        let _ = writeln!(out, "\n## Latest recovery ({})\n- {}", health.date, describe_health(health));
    }

    if !snap.injuries.is_empty() {
        out.push_str("\n## Active injuries\n");
        for injury in &snap.injuries {
            let _ = write!(out, "- {} (severity {}/10, since {})", injury.area, injury.severity, injury.started_on);
            if let Some(notes) = &injury.notes {
                let _ = write!(out, ": {notes}");
            }
            out.push('\n');
        }
    }

    if !snap.whiteboard_digest.is_empty() {
        out.push('\n');
        out.push_str(&snap.whiteboard_digest);
        out.push('\n');
    }
    out
}

/// Completed and planned sessions of the recent window, oldest first.
pub fn recent_section(ctx: &AgentContext) -> String {
    let mut out = String::from("## Recent sessions\n");
    if ctx.snapshot.recent.is_empty() {
        out.push_str("- none recorded\n");
    }
    for workout in &ctx.snapshot.recent {
        let _ = writeln!(out, "- {}: {}", workout.date, describe_workout(workout));
    }
    out
}

pub fn upcoming_section(ctx: &AgentContext) -> String {
    let mut out = String::from("## Coming up\n");
    if ctx.snapshot.upcoming.is_empty() {
        out.push_str("- nothing scheduled\n");
    }
    for workout in &ctx.snapshot.upcoming {
        let _ = writeln!(out, "- {}: {}", workout.date, describe_workout(workout));
    }
    out
}

/// The last few chat turns, for conversational tasks.
pub fn history_section(history: &[ChatTurn]) -> String {
    let turns = recent_turns(history, HISTORY_TURNS);
    if turns.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Conversation so far\n");
    for turn in turns {
        let _ = writeln!(out, "{}: {}", turn.role.as_str(), turn.content);
    }
    out
}

pub fn describe_workout(w: &Workout) -> String {
    let mut text = format!("{} [{}] {}", w.title, w.kind, w.status.as_str());
    let p = &w.prescribed;
    if let Some(km) = p.distance_km {
        let _ = write!(text, ", planned {km:.1} km");
    }
    if let Some(pace) = &p.pace {
        let _ = write!(text, " @ {pace}");
    }
    if let Some(actuals) = w.actuals.as_ref().filter(|_| w.status == WorkoutStatus::Completed) {
        let _ = write!(
            text,
            ", did {:.2} km in {:.0} min",
            actuals.distance_km,
            actuals.duration_s / 60.0
        );
        if let Some(pace) = actuals.pace_s_per_km() {
            let secs = pace.round() as u64;
            let _ = write!(text, " ({}:{:02}/km)", secs / 60, secs % 60);
        }
        if let Some(hr) = actuals.avg_hr {
            let _ = write!(text, ", avg HR {hr}");
        }
    }
    text
}

pub fn describe_health(h: &HealthSample) -> String {
    let mut parts = Vec::new();
    if let Some(v) = h.resting_hr {
        parts.push(format!("resting HR {v}"));
    }
    if let Some(v) = h.hrv_ms {
        parts.push(format!("HRV {v:.0} ms"));
    }
    if let Some(v) = h.sleep_hours {
        parts.push(format!("sleep {v:.1} h"));
    }
    if let Some(v) = h.sleep_score {
        parts.push(format!("sleep score {v}"));
    }
    if let Some(v) = h.body_battery {
        parts.push(format!("body battery {v}"));
    }
    if let Some(v) = h.stress {
        parts.push(format!("stress {v}"));
    }
    if parts.is_empty() {
        return "no metrics".into();
    }
    parts.join(", ")
}

use shared::Server;
use std::fmt::Write;

use crate::listing::{format_file_size, install_label, replica_timestamp};
use crate::metrics::MetricsBuffer;
use crate::state::Dashboard;

/// Plain-text snapshot of the dashboard for the terminal.
pub struct Renderer {
    width: usize,
}

impl Renderer {
    pub fn new(width: usize) -> Self {
        Self { width: width.max(40) }
    }

    pub fn render(&self, dashboard: &Dashboard) -> String {
        let mut out = String::new();

        self.draw_heading(&mut out, "Servers");
        if dashboard.servers().next().is_none() {
            out.push_str("  (none)\n");
        }
        for server in dashboard.servers() {
            self.draw_server(&mut out, server);
        }

        self.draw_heading(&mut out, "Mods");
        for m in dashboard.mods() {
            let origin = if m.is_default { " [default]" } else { "" };
            let _ = writeln!(
                out,
                "  {:<32} {:>10}  {}{}  id={}",
                m.name,
                format_file_size(m.size),
                install_label(m.installed, m.installing),
                origin,
                m.id
            );
        }

        self.draw_heading(&mut out, "Configs");
        for c in dashboard.configs() {
            let _ = writeln!(
                out,
                "  {:<32} {:>10}  {}",
                c.name,
                format_file_size(c.size),
                install_label(c.installed, c.installing)
            );
        }

        self.draw_heading(&mut out, "Worlds");
        for b in dashboard.backups() {
            let _ = writeln!(
                out,
                "  {:<48} {:>10}  {}",
                b.key,
                format_file_size(b.file_size),
                install_label(b.installed, b.installing)
            );
        }

        self.draw_heading(&mut out, "Automatic backups");
        for b in dashboard.replicas() {
            let taken = replica_timestamp(&b.key).unwrap_or_else(|| b.key.clone());
            let _ = writeln!(
                out,
                "  {:<20} {:>10}  {}  {}",
                taken,
                format_file_size(b.file_size),
                install_label(b.installed, b.installing),
                b.key
            );
        }

        if let Some(sample) = dashboard.metrics().latest() {
            self.draw_heading(&mut out, "Utilization");
            let _ = writeln!(out, "  cpu {}%  memory {}%", sample.cpu, sample.memory);
        }

        if !dashboard.alerts().is_empty() {
            self.draw_heading(&mut out, "Alerts");
            for alert in dashboard.alerts() {
                let _ = writeln!(out, "  [{}] {}", alert.id, alert.message);
            }
        }

        out
    }

    fn draw_heading(&self, out: &mut String, title: &str) {
        let rule = "-".repeat(self.width.saturating_sub(title.len() + 4));
        let _ = writeln!(out, "-- {} {}", title, rule);
    }

    fn draw_server(&self, out: &mut String, server: &Server) {
        let _ = writeln!(
            out,
            "  {} ({}) {}:{} [{}]",
            server.deployment_name,
            server.world_details.world,
            server.server_ip,
            server.server_port,
            server.state
        );
        match &server.join_code {
            Some(code) => {
                let _ = writeln!(out, "    join code: {}", code);
            }
            None => out.push_str("    join code: pending\n"),
        }
    }

    /// The last `count` log lines, oldest first.
    pub fn render_logs(&self, dashboard: &Dashboard, count: usize) -> String {
        let logs = dashboard.logs();
        let start = logs.len().saturating_sub(count);
        let mut out = String::new();
        for line in &logs[start..] {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// One bar per sample; bars scale to the renderer width.
    pub fn render_metrics(&self, metrics: &MetricsBuffer) -> String {
        let bar_width = self.width.saturating_sub(30);
        let mut out = String::new();
        for sample in metrics.iter() {
            let filled = ((sample.cpu.clamp(0.0, 100.0) / 100.0) * bar_width as f64) as usize;
            let _ = writeln!(
                out,
                "  {:>6.2}% cpu {:>6.2}% mem |{}{}|",
                sample.cpu,
                sample.memory,
                "#".repeat(filled),
                " ".repeat(bar_width - filled)
            );
        }
        out
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(80)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::BackupListing;
    use shared::{Backup, PushEvent};

    #[test]
    fn test_render_lists_replicas_by_timestamp() {
        let mut dashboard = Dashboard::new();
        dashboard.load_backups(BackupListing {
            primary: vec![Backup::new("w/1/midgard.db", 2048)],
            replica: vec![Backup::new("w/1/midgard_backup_auto-20240101120000.db", 1024)],
        });

        let text = Renderer::default().render(&dashboard);
        assert!(text.contains("w/1/midgard.db"));
        assert!(text.contains("2024-01-01 12:00"));
        assert!(text.contains("1 KB"));
        assert!(text.contains("Not Installed"));
    }

    #[test]
    fn test_render_logs_tail() {
        let mut dashboard = Dashboard::new();
        dashboard.apply(PushEvent::Logs {
            logs: vec!["a".into(), "b".into(), "c".into()],
        });
        assert_eq!(Renderer::default().render_logs(&dashboard, 2), "b\nc\n");
        assert_eq!(Renderer::default().render_logs(&dashboard, 10), "a\nb\nc\n");
    }

    #[test]
    fn test_render_metrics_bars() {
        let mut metrics = MetricsBuffer::new();
        metrics.record_at(100.0, 10.0, 1);
        metrics.record_at(0.0, 10.0, 2);
        let text = Renderer::new(40).render_metrics(&metrics);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("##########"));
        assert!(!lines[1].contains('#'));
    }
}

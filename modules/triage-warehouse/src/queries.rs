// SQL for every statement the dashboard runs against the warehouse.
//
// Report queries take two positional parameters: the first day of the window
// and the day after the last one. The window is half-open.

use triage_common::ReportView;

pub const REPORTS_TABLE: &str = "`moz-fx-data-shared-prod.firefox_desktop.broken_site_report`";
pub const USER_REPORTS_DATASET: &str = "webcompat_user_reports";
pub const KNOWLEDGE_BASE_DATASET: &str = "webcompat_knowledge_base";

/// Columns shared by every report view.
fn report_columns() -> String {
    format!(
        r#"
    reports.document_id AS uuid,
    CAST(reports.submission_timestamp AS DATETIME) AS reported_at,
    reports.client_info.app_display_version AS app_version,
    reports.metrics.string.broken_site_report_breakage_category AS breakage_category,
    reports.metrics.string.broken_site_report_tab_info_antitracking_block_list AS tp_status,
    reports.metrics.text2.broken_site_report_browser_info_app_default_useragent_string AS ua_string,
    reports.metrics.text2.broken_site_report_description AS comments,
    reports.metrics.url2.broken_site_report_url AS url,
    reports.normalized_app_name AS app_name,
    reports.normalized_channel AS app_channel,
    reports.metadata.user_agent.version AS app_major_version,
    ARRAY(
      SELECT label
      FROM {ds}.labels
      WHERE report_uuid = reports.document_id
    ) AS labels,
    bp.label AS prediction,
    bp.probability AS prob,
    ml_trans.translated_text AS translated_comments,
    ml_trans.language_code AS translated_from,
    IF(
      client_info.windows_build_number IS NOT NULL,
      mozfun.norm.windows_version_info('Windows_NT', client_info.os_version, client_info.windows_build_number),
      reports.normalized_os
    ) AS os"#,
        ds = USER_REPORTS_DATASET
    )
}

fn report_joins() -> String {
    format!(
        r#"
  FROM {table} AS reports
  LEFT JOIN {ds}.bugbug_predictions AS bp ON reports.document_id = bp.report_uuid
  LEFT JOIN {ds}.translations AS ml_trans ON reports.document_id = ml_trans.report_uuid"#,
        table = REPORTS_TABLE,
        ds = USER_REPORTS_DATASET
    )
}

const WINDOW: &str =
    "reports.submission_timestamp >= TIMESTAMP(?) AND reports.submission_timestamp < TIMESTAMP(?)";

/// Report query for `view`.
pub fn reports_sql(view: ReportView) -> String {
    let columns = report_columns();
    let joins = report_joins();
    let ds = USER_REPORTS_DATASET;

    match view {
        // Actioned reports stay in the result: the top-N cut happens before
        // they are removed, so the worklist does not refill as it is worked.
        ReportView::UserReports => format!(
            r#"SELECT{columns},
    EXISTS (
      SELECT 1 FROM {ds}.report_actions
      WHERE report_actions.report_uuid = reports.document_id
    ) AS has_actions{joins}
  WHERE {WINDOW}
  ORDER BY CHAR_LENGTH(comments) DESC"#
        ),
        ReportView::InconsistentEntries => format!(
            r#"SELECT{columns}{joins}
  WHERE {WINDOW}
    AND NOT EXISTS (
      SELECT 1 FROM {ds}.report_actions
      WHERE report_actions.report_uuid = reports.document_id
    )
  ORDER BY
    CASE WHEN bp.label = 'valid' THEN 1 WHEN bp.label = 'invalid' THEN 2 ELSE 3 END,
    CASE WHEN bp.label = 'valid' THEN bp.probability END DESC,
    CASE WHEN bp.label = 'invalid' THEN bp.probability END ASC"#
        ),
        ReportView::Classified(_) => format!(
            r#"SELECT{columns},
    action.type AS action{joins}
  LEFT JOIN (
    SELECT
      report_uuid,
      type,
      ROW_NUMBER() OVER (PARTITION BY report_uuid ORDER BY created_at DESC) AS rn
    FROM {ds}.report_actions
  ) AS action ON reports.document_id = action.report_uuid AND action.rn = 1
  WHERE {WINDOW}
    AND reports.metrics.text2.broken_site_report_description != ''"#
        ),
    }
}

/// Every URL pattern with the title of the bug it points at.
pub fn url_patterns_sql() -> String {
    format!(
        "SELECT patterns.*, bugs.title \
         FROM {kb}.url_patterns AS patterns \
         LEFT JOIN {kb}.bugzilla_bugs AS bugs ON patterns.bug = bugs.number",
        kb = KNOWLEDGE_BASE_DATASET
    )
}

/// Parameters: report uuid, action type.
pub fn insert_action_sql() -> String {
    format!(
        "INSERT INTO {USER_REPORTS_DATASET}.report_actions (report_uuid, type, created_at) \
         VALUES (?, ?, CURRENT_DATETIME())"
    )
}

/// Parameters: report uuid, label. Human labels only.
pub fn insert_label_sql() -> String {
    format!(
        "INSERT INTO {USER_REPORTS_DATASET}.labels (report_uuid, label, created_at, is_ml) \
         VALUES (?, ?, CURRENT_DATETIME(), false)"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_common::PredictionFilter;

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn every_report_query_binds_the_window() {
        for view in [
            ReportView::UserReports,
            ReportView::InconsistentEntries,
            ReportView::Classified(PredictionFilter::Valid),
        ] {
            let sql = reports_sql(view);
            assert_eq!(placeholders(&sql), 2, "{view}");
            assert!(sql.contains("TIMESTAMP(?) AND reports.submission_timestamp < TIMESTAMP(?)"));
        }
    }

    #[test]
    fn user_reports_keep_actioned_rows_and_flag_them() {
        let sql = reports_sql(ReportView::UserReports);
        assert!(sql.contains("AS has_actions"));
        assert!(!sql.contains("NOT EXISTS"));
        assert!(sql.contains("ORDER BY CHAR_LENGTH(comments) DESC"));
    }

    #[test]
    fn inconsistent_entries_exclude_actioned_rows() {
        let sql = reports_sql(ReportView::InconsistentEntries);
        assert!(sql.contains("NOT EXISTS"));
        assert!(!sql.contains("AS has_actions"));
    }

    #[test]
    fn classified_reports_carry_latest_action_and_need_a_comment() {
        // The prediction filter is applied after the fetch, so all filters share one query.
        let all = reports_sql(ReportView::Classified(PredictionFilter::All));
        let invalid = reports_sql(ReportView::Classified(PredictionFilter::Invalid));
        assert_eq!(all, invalid);
        assert!(all.contains("action.type AS action"));
        assert!(all.contains("action.rn = 1"));
        assert!(all.contains("broken_site_report_description != ''"));
    }

    #[test]
    fn inserts_take_two_parameters() {
        assert_eq!(placeholders(&insert_action_sql()), 2);
        assert_eq!(placeholders(&insert_label_sql()), 2);
        assert!(insert_label_sql().contains("false"));
        assert_eq!(placeholders(&url_patterns_sql()), 0);
    }
}

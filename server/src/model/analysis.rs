use chrono::Utc;

use crate::{db_core::prelude::*, error::AppResult, prompt::priority::PriorityAssessment};

pub struct AnalysisCtrl;

impl AnalysisCtrl {
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        email_id: Uuid,
        assessment: &PriorityAssessment,
    ) -> AppResult<email_analysis::Model> {
        let active_model = email_analysis::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            email_id: ActiveValue::Set(email_id),
            priority_score: ActiveValue::Set(assessment.score),
            explanation: ActiveValue::Set(assessment.explanation.clone()),
            action_items: ActiveValue::Set(assessment.action_items.clone()),
            urgency_factors: ActiveValue::Set(assessment.urgency_factors.clone()),
            analyzed_at: ActiveValue::Set(Utc::now().into()),
        };

        Ok(active_model.insert(conn).await?)
    }

    /// Manual correction from user feedback. Only the score changes.
    pub async fn update_score(
        conn: &DatabaseConnection,
        email_id: Uuid,
        priority_score: i32,
    ) -> AppResult<u64> {
        let result = EmailAnalysis::update_many()
            .col_expr(
                email_analysis::Column::PriorityScore,
                Expr::value(priority_score.clamp(0, 100)),
            )
            .filter(email_analysis::Column::EmailId.eq(email_id))
            .exec(conn)
            .await?;

        Ok(result.rows_affected)
    }
}

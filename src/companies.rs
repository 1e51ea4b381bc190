use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    error::{TrackerError, TrackerResult, ValidationError},
    model::{Company, CompanyId, HourlyRate, NewCompany},
    store::CompanyStore,
};

/// Raw user input for creating or editing a company. `id` is set when editing.
#[derive(Debug, Clone, Default)]
pub struct CompanyForm {
    pub id: Option<CompanyId>,
    pub name: String,
    pub rate: String,
}

impl CompanyForm {
    fn validate(&self) -> Result<(Arc<str>, HourlyRate), ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let rate = self.rate.parse::<HourlyRate>()?;
        Ok((name.into(), rate))
    }
}

pub struct CompanyEditor {
    companies: Arc<dyn CompanyStore>,
}

impl CompanyEditor {
    pub fn new(companies: Arc<dyn CompanyStore>) -> Self {
        Self { companies }
    }

    /// Inserts a new company or updates an existing one. Nothing is written if the form is invalid.
    #[instrument(skip(self))]
    pub async fn save(&self, form: CompanyForm) -> TrackerResult<Company> {
        let (name, hourly_rate) = form.validate()?;

        let Some(id) = form.id else {
            let company = self
                .companies
                .insert(NewCompany { name, hourly_rate })
                .await
                .map_err(TrackerError::Store)?;
            info!("Created company {}", company.id);
            return Ok(company);
        };

        if self.find(id).await?.is_none() {
            return Err(TrackerError::NotFound(id));
        }
        let company = Company {
            id,
            name,
            hourly_rate,
        };
        self.companies
            .update(company.clone())
            .await
            .map_err(TrackerError::Store)?;
        info!("Updated company {id}");
        Ok(company)
    }

    /// Deletes the company and everything logged for it.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: CompanyId) -> TrackerResult<()> {
        if self.find(id).await?.is_none() {
            return Err(TrackerError::NotFound(id));
        }
        self.companies
            .delete(id)
            .await
            .map_err(TrackerError::Store)?;
        info!("Deleted company {id}");
        Ok(())
    }

    async fn find(&self, id: CompanyId) -> TrackerResult<Option<Company>> {
        self.companies
            .get_by_id(id)
            .await
            .map_err(TrackerError::Store)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;

    use super::*;
    use crate::{
        error::ErrorKind,
        model::NewInterval,
        store::{local::LocalStore, IntervalStore, MockCompanyStore},
    };

    fn form(id: Option<CompanyId>, name: &str, rate: &str) -> CompanyForm {
        CompanyForm {
            id,
            name: name.into(),
            rate: rate.into(),
        }
    }

    #[tokio::test]
    async fn creates_with_trimmed_name() -> Result<()> {
        let store = Arc::new(LocalStore::in_memory());
        let editor = CompanyEditor::new(store.clone());

        let company = editor.save(form(None, "  Acme Corp ", "42.5")).await?;
        assert_eq!(company.name.as_ref(), "Acme Corp");
        assert_eq!(*company.hourly_rate, 42.5);
        assert_eq!(store.get_by_id(company.id).await?, Some(company));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_invalid_forms() {
        // nothing may reach the store
        let mut companies = MockCompanyStore::new();
        companies.expect_insert().never();
        companies.expect_update().never();
        let editor = CompanyEditor::new(Arc::new(companies));

        let blank = editor.save(form(None, "   ", "10")).await.unwrap_err();
        assert!(matches!(
            blank,
            TrackerError::Validation(ValidationError::EmptyName)
        ));

        for rate in ["", "abc", "0", "-5", "NaN", "inf"] {
            let error = editor.save(form(None, "Acme", rate)).await.unwrap_err();
            assert!(
                matches!(error, TrackerError::Validation(ValidationError::InvalidRate(_))),
                "{rate} was accepted"
            );
        }
    }

    #[tokio::test]
    async fn edits_existing_company() -> Result<()> {
        let store = Arc::new(LocalStore::in_memory());
        let editor = CompanyEditor::new(store.clone());
        let created = editor.save(form(None, "Acme", "30")).await?;

        let edited = editor
            .save(form(Some(created.id), "Acme Inc", "45"))
            .await?;
        assert_eq!(edited.id, created.id);

        let mut all = CompanyStore::observe_all(store.as_ref());
        let companies = all.next().await.unwrap()?;
        assert_eq!(companies, vec![edited]);
        Ok(())
    }

    #[tokio::test]
    async fn editing_or_deleting_missing_company_fails() {
        let store = Arc::new(LocalStore::in_memory());
        let editor = CompanyEditor::new(store);

        let error = editor
            .save(form(Some(CompanyId(3)), "Acme", "30"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);

        let error = editor.delete(CompanyId(3)).await.unwrap_err();
        assert!(matches!(error, TrackerError::NotFound(CompanyId(3))));
    }

    #[tokio::test]
    async fn delete_cascades() -> Result<()> {
        let store = Arc::new(LocalStore::in_memory());
        let editor = CompanyEditor::new(store.clone());
        let company = editor.save(form(None, "Acme", "30")).await?;
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        IntervalStore::insert(
            store.as_ref(),
            NewInterval {
                company_id: company.id,
                start,
                end: start + chrono::Duration::minutes(10),
                duration_millis: 600_000,
            },
        )
        .await?;

        editor.delete(company.id).await?;
        assert_eq!(store.get_by_id(company.id).await?, None);
        let mut all = IntervalStore::observe_all(store.as_ref());
        assert!(all.next().await.unwrap()?.is_empty());
        Ok(())
    }
}

use agri_serve::{
    Config, FertilizerRecommender, GeminiClient, PestClassifier, PesticideTable, YieldPredictor,
};
use log::info;

/// Every loaded model and table, shared read-only by all requests.
pub struct AppState {
    pub config: Config,
    pub pests: PestClassifier,
    pub pesticides: PesticideTable,
    pub yields: YieldPredictor,
    pub fertilizer: FertilizerRecommender,
}

impl AppState {
    /// Loads every artifact named by `config`. Any failure is fatal.
    pub fn load(config: Config) -> agri_serve::Result<Self> {
        let pests = PestClassifier::load(&config)?;
        let pesticides = PesticideTable::load(&config.pesticide_csv)?;
        let yields = YieldPredictor::load(&config)?;
        let fertilizer = FertilizerRecommender::new(Box::new(GeminiClient::from_config(&config)?));

        info!("All models loaded");

        Ok(AppState {
            config,
            pests,
            pesticides,
            yields,
            fertilizer,
        })
    }
}

//! `/getIP`: classify the caller and optionally describe its ISP.

use axum::extract::{RawQuery, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::geo::classify::normalize_address;
use crate::geo::{ClientClassification, DistanceUnit, IpInfo};
use crate::http::request::{first_param, ClientIp};
use crate::http::state::AppState;
use crate::observability::metrics;

/// Body of a `/getIP` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpResult {
    #[serde(rename = "processedString")]
    pub processed_string: String,
    #[serde(rename = "rawIspInfo")]
    pub raw_isp_info: IpInfo,
}

pub async fn get_ip(State(state): State<AppState>, client: ClientIp, RawQuery(query): RawQuery) -> Json<IpResult> {
    metrics::record_request("getIP");

    let address = normalize_address(client.as_str()).to_string();
    let classification = ClientClassification::of(&address);

    if let Some(description) = classification.description() {
        return Json(IpResult {
            processed_string: format!("{address} - {description}"),
            raw_isp_info: IpInfo::default(),
        });
    }

    let wants_isp = first_param(query.as_deref(), "isp").as_deref() == Some("true");
    if !wants_isp {
        return Json(IpResult {
            processed_string: address,
            raw_isp_info: IpInfo::default(),
        });
    }

    let unit = DistanceUnit::from_query(first_param(query.as_deref(), "distance").as_deref());
    let info = state.ipinfo.lookup_or_default(&address).await;
    let summary = info.isp_summary(&state.server_coordinate, unit);

    Json(IpResult {
        processed_string: format!("{address} - {summary}"),
        raw_isp_info: info,
    })
}

//! IOL wire types and conversions to domain types
//!
//! Field names follow the IOL JSON (camelCase, Spanish).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{normalize_symbol, Candle, Quote, Timeframe};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    900
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Punta {
    pub cantidad_compra: f64,
    pub precio_compra: f64,
    pub precio_venta: f64,
    pub cantidad_venta: f64,
}

/// GET /{mercado}/Titulos/{simbolo}/Cotizacion
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cotizacion {
    pub ultimo_precio: f64,
    pub variacion: Option<f64>,
    pub apertura: Option<f64>,
    pub maximo: Option<f64>,
    pub minimo: Option<f64>,
    pub cierre_anterior: Option<f64>,
    pub volumen_nominal: Option<f64>,
    pub puntas: Option<Vec<Punta>>,
    pub moneda: Option<String>,
    pub fecha_hora: Option<String>,
}

impl Cotizacion {
    pub fn into_quote(self, symbol: &str) -> Quote {
        let best = self.puntas.as_ref().and_then(|p| p.first()).cloned();
        let ts = self
            .fecha_hora
            .as_deref()
            .and_then(parse_iol_datetime)
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        Quote {
            symbol: normalize_symbol(symbol),
            price: self.ultimo_precio,
            previous_close: self.cierre_anterior.filter(|p| *p > 0.0),
            open: self.apertura.filter(|p| *p > 0.0),
            high: self.maximo.filter(|p| *p > 0.0),
            low: self.minimo.filter(|p| *p > 0.0),
            volume: self.volumen_nominal,
            bid: best.as_ref().map(|p| p.precio_compra).filter(|p| *p > 0.0),
            ask: best.as_ref().map(|p| p.precio_venta).filter(|p| *p > 0.0),
            currency: currency_code(self.moneda.as_deref()),
            source: "IOL".to_string(),
            ts,
        }
    }
}

/// Map IOL currency labels ("peso_Argentino", "dolar_Estadounidense") to ISO codes
pub fn currency_code(moneda: Option<&str>) -> String {
    match moneda.map(|m| m.to_lowercase()) {
        Some(m) if m.contains("dolar") => "USD".to_string(),
        _ => "ARS".to_string(),
    }
}

/// One row of /seriehistorica
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerieHistoricaRow {
    pub ultimo_precio: f64,
    pub apertura: f64,
    pub maximo: f64,
    pub minimo: f64,
    pub volumen_nominal: f64,
    pub fecha_hora: String,
}

/// Convert IOL daily rows (newest first) to candles (oldest first)
pub fn serie_to_candles(rows: Vec<SerieHistoricaRow>) -> Vec<Candle> {
    let day_ms = Timeframe::Day1.duration_secs() as i64 * 1000;
    let mut candles: Vec<Candle> = rows
        .into_iter()
        .filter(|r| r.ultimo_precio > 0.0)
        .filter_map(|r| {
            let open_time = parse_iol_datetime(&r.fecha_hora)?;
            let open = if r.apertura > 0.0 { r.apertura } else { r.ultimo_precio };
            Some(Candle {
                open_time,
                close_time: open_time + day_ms,
                timeframe: Timeframe::Day1,
                open,
                high: r.maximo.max(open).max(r.ultimo_precio),
                low: if r.minimo > 0.0 {
                    r.minimo.min(open).min(r.ultimo_precio)
                } else {
                    open.min(r.ultimo_precio)
                },
                close: r.ultimo_precio,
                volume: r.volumen_nominal,
            })
        })
        .collect();
    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    candles
}

/// Parse IOL timestamps ("2024-03-01T17:00:00", "2024-03-01T17:00:00.123-03:00", "2024-03-01")
pub fn parse_iol_datetime(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    let date = NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Saldo {
    pub liquidacion: String,
    pub saldo: f64,
    pub comprometido: f64,
    pub disponible: f64,
    pub disponible_operar: Option<f64>,
}

impl Saldo {
    /// Amount usable for new orders
    pub fn available(&self) -> f64 {
        self.disponible_operar.unwrap_or(self.disponible)
    }

    fn is_immediate(&self) -> bool {
        matches!(
            self.liquidacion.to_lowercase().as_str(),
            "inmediato" | "inmediata" | "t0" | "hrs0" | "0"
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cuenta {
    pub numero: String,
    pub tipo: String,
    pub moneda: String,
    pub disponible: f64,
    pub total: f64,
    pub saldos: Vec<Saldo>,
}

/// GET /estadocuenta
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EstadoCuenta {
    pub cuentas: Vec<Cuenta>,
}

pub const PESOS_ACCOUNT_TYPE: &str = "inversion_Argentina_Pesos";

impl EstadoCuenta {
    fn pesos_account(&self) -> Option<&Cuenta> {
        self.cuentas.iter().find(|c| c.tipo == PESOS_ACCOUNT_TYPE)
    }

    /// Balance available to operate in the peso account.
    ///
    /// Preference: immediate settlement (when asked), then 48hs, then the largest, then the first.
    pub fn available_balance(&self, prefer_immediate: bool) -> f64 {
        let Some(cuenta) = self.pesos_account() else {
            return 0.0;
        };
        if cuenta.saldos.is_empty() {
            return cuenta.disponible;
        }
        if prefer_immediate {
            if let Some(s) = cuenta.saldos.iter().find(|s| s.is_immediate()) {
                return s.available();
            }
        }
        if let Some(s) = cuenta
            .saldos
            .iter()
            .find(|s| s.liquidacion.eq_ignore_ascii_case("hrs48"))
        {
            return s.available();
        }
        cuenta
            .saldos
            .iter()
            .map(|s| s.available())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .unwrap_or(0.0)
    }

    /// Every settlement bucket of the peso account
    pub fn all_balances(&self) -> Vec<AccountBalance> {
        self.pesos_account()
            .map(|c| {
                c.saldos
                    .iter()
                    .map(|s| AccountBalance {
                        settlement: s.liquidacion.clone(),
                        available: s.available(),
                        committed: s.comprometido,
                        total: s.saldo,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Balance for one settlement term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub settlement: String,
    pub available: f64,
    pub committed: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Titulo {
    pub simbolo: String,
    pub descripcion: String,
    pub mercado: String,
    pub tipo: String,
    pub moneda: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Activo {
    pub cantidad: f64,
    pub ultimo_precio: f64,
    pub ppc: f64,
    pub ganancia_porcentaje: f64,
    pub ganancia_dinero: f64,
    pub valorizado: f64,
    pub titulo: Titulo,
}

/// GET /portafolio/{pais}
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Portafolio {
    pub pais: String,
    pub activos: Vec<Activo>,
}

/// Held instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: u64,
    pub average_price: f64,
    pub last_price: f64,
    pub valuation: f64,
    pub gain_pct: f64,
    pub instrument_type: String,
}

impl Portafolio {
    pub fn holdings(&self) -> Vec<Holding> {
        self.activos
            .iter()
            .filter(|a| a.cantidad > 0.0 && !a.titulo.simbolo.is_empty())
            .map(|a| Holding {
                symbol: normalize_symbol(&a.titulo.simbolo),
                quantity: a.cantidad.floor() as u64,
                average_price: a.ppc,
                last_price: a.ultimo_precio,
                valuation: a.valorizado,
                gain_pct: a.ganancia_porcentaje,
                instrument_type: a.titulo.tipo.clone(),
            })
            .collect()
    }
}

/// Body for POST /operar/Comprar and /operar/Vender
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub mercado: String,
    pub simbolo: String,
    pub cantidad: u64,
    pub precio: f64,
    pub plazo: String,
    /// Order validity date (YYYY-MM-DD)
    pub validez: String,
}

/// Row of GET /operaciones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Operacion {
    pub numero: i64,
    pub fecha_orden: Option<String>,
    pub tipo: String,
    pub estado: String,
    pub mercado: String,
    pub simbolo: String,
    pub cantidad: Option<f64>,
    pub monto: Option<f64>,
    pub precio: Option<f64>,
    pub fecha_operada: Option<String>,
    pub cantidad_operada: Option<f64>,
    pub precio_operado: Option<f64>,
    pub monto_operado: Option<f64>,
}

/// Row of GET /bCBA/Titulos/Cotizacion/PanelGeneral
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelTitulo {
    pub simbolo: String,
    pub ultimo_precio: f64,
    pub variacion_porcentual: f64,
    pub apertura: f64,
    pub maximo: f64,
    pub minimo: f64,
    pub ultimo_cierre: f64,
    pub volumen: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PanelGeneral {
    pub titulos: Vec<PanelTitulo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estado(saldos: Vec<(&str, f64, Option<f64>)>) -> EstadoCuenta {
        EstadoCuenta {
            cuentas: vec![
                Cuenta {
                    tipo: "inversion_Estados_Unidos_Dolares".into(),
                    disponible: 999.0,
                    ..Default::default()
                },
                Cuenta {
                    tipo: PESOS_ACCOUNT_TYPE.into(),
                    saldos: saldos
                        .into_iter()
                        .map(|(liq, disp, op)| Saldo {
                            liquidacion: liq.into(),
                            disponible: disp,
                            disponible_operar: op,
                            ..Default::default()
                        })
                        .collect(),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_balance_prefers_immediate_settlement() {
        let e = estado(vec![("hrs48", 5000.0, None), ("inmediato", 1200.0, Some(1100.0))]);
        assert_eq!(e.available_balance(true), 1100.0);
        assert_eq!(e.available_balance(false), 5000.0);
    }

    #[test]
    fn test_balance_falls_back_to_max() {
        let e = estado(vec![("hrs24", 300.0, None), ("hrs72", 700.0, None)]);
        assert_eq!(e.available_balance(true), 700.0);
    }

    #[test]
    fn test_balance_without_pesos_account_is_zero() {
        let e = EstadoCuenta::default();
        assert_eq!(e.available_balance(true), 0.0);
    }

    #[test]
    fn test_cotizacion_json_to_quote() {
        let json = r#"{
            "ultimoPrecio": 1520.5,
            "cierreAnterior": 1500.0,
            "apertura": 1505.0,
            "maximo": 1530.0,
            "minimo": 1498.0,
            "volumenNominal": 123456,
            "moneda": "peso_Argentino",
            "puntas": [{"cantidadCompra": 100, "precioCompra": 1520.0, "precioVenta": 1521.0, "cantidadVenta": 50}],
            "fechaHora": "2024-03-01T16:59:58.12"
        }"#;
        let c: Cotizacion = serde_json::from_str(json).unwrap();
        let q = c.into_quote("ggal.ba");
        assert_eq!(q.symbol, "GGAL");
        assert_eq!(q.price, 1520.5);
        assert_eq!(q.bid, Some(1520.0));
        assert_eq!(q.ask, Some(1521.0));
        assert_eq!(q.currency, "ARS");
        assert_eq!(q.source, "IOL");
    }

    #[test]
    fn test_serie_sorted_oldest_first() {
        let rows = vec![
            SerieHistoricaRow {
                ultimo_precio: 11.0,
                apertura: 10.0,
                maximo: 12.0,
                minimo: 9.0,
                volumen_nominal: 100.0,
                fecha_hora: "2024-03-02T17:00:00".into(),
            },
            SerieHistoricaRow {
                ultimo_precio: 10.0,
                apertura: 9.5,
                maximo: 10.5,
                minimo: 9.0,
                volumen_nominal: 90.0,
                fecha_hora: "2024-03-01T17:00:00".into(),
            },
        ];
        let candles = serie_to_candles(rows);
        assert_eq!(candles.len(), 2);
        assert!(candles[0].open_time < candles[1].open_time);
        assert_eq!(candles[1].close, 11.0);
    }

    #[test]
    fn test_portfolio_holdings() {
        let json = r#"{"pais":"argentina","activos":[
            {"cantidad": 10, "ultimoPrecio": 1500, "ppc": 1400, "gananciaPorcentaje": 7.1, "valorizado": 15000,
             "titulo": {"simbolo": "GGAL", "tipo": "ACCIONES"}},
            {"cantidad": 0, "titulo": {"simbolo": "YPFD"}}
        ]}"#;
        let p: Portafolio = serde_json::from_str(json).unwrap();
        let h = p.holdings();
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].symbol, "GGAL");
        assert_eq!(h[0].quantity, 10);
        assert_eq!(h[0].average_price, 1400.0);
    }
}

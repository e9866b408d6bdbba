//! Reference data for the stand: products on sale and the add-ons a seller
//! can attach to them.
//!
//! Both tables are fixed for the lifetime of the process. Nothing mutates
//! them after [`Catalog::builtin`] returns, so a single instance is shared
//! by the cart, the pricing engine and the receipt layout.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product on the menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub price: Decimal,
    pub image: String,
}

/// Optional modifier with its own price delta (may be zero).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Product>,
    add_ons: Vec<AddOn>,
}

fn product(id: u32, name: &str, price: i64, image: &str) -> Product {
    Product {
        id,
        name: name.to_string(),
        price: Decimal::from(price),
        image: image.to_string(),
    }
}

fn add_on(id: &str, name: &str, price: i64) -> AddOn {
    AddOn {
        id: id.to_string(),
        name: name.to_string(),
        price: Decimal::from(price),
    }
}

impl Catalog {
    pub fn new(products: Vec<Product>, add_ons: Vec<AddOn>) -> Self {
        Self { products, add_ons }
    }

    /// The compiled-in menu.
    pub fn builtin() -> Self {
        let products = vec![
            product(1, "Azulito", 35, "https://images.unsplash.com/photo-1513558161293-cdaf765ed2fd?auto=format&fit=crop&w=300&q=80"),
            product(2, "Baby Blue", 30, "https://images.unsplash.com/photo-1546171753-97d7676e4602?auto=format&fit=crop&w=300&q=80"),
            product(3, "Michelada", 40, "https://images.unsplash.com/photo-1513420901235-f4e953a5d851?auto=format&fit=crop&w=300&q=80"),
            product(4, "Michelada Mango", 45, "https://images.unsplash.com/photo-1525999059881-ebc9258286a1?auto=format&fit=crop&w=300&q=80"),
            product(5, "Cimarrona", 25, "https://images.unsplash.com/photo-1595981267035-7b04ca84a82d?auto=format&fit=crop&w=300&q=80"),
            product(6, "Mango Breeze", 35, "https://images.unsplash.com/photo-1502741224143-90386d7f8c82?auto=format&fit=crop&w=300&q=80"),
            product(7, "Cantarito", 50, "https://images.unsplash.com/photo-1588612143003-88849ad7b26e?auto=format&fit=crop&w=300&q=80"),
        ];
        let add_ons = vec![
            add_on("sin_hielo", "Sin Hielo", 0),
            add_on("extra_shot", "Extra Shot", 10),
            add_on("sin_sal", "Sin Sal", 0),
        ];
        Self::new(products, add_ons)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn add_ons(&self) -> &[AddOn] {
        &self.add_ons
    }

    pub fn product(&self, id: u32) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn add_on(&self, id: &str) -> Option<&AddOn> {
        self.add_ons.iter().find(|a| a.id == id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
